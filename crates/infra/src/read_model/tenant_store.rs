use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use staydesk_core::TenantId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantStoreError {
    #[error("read model lock poisoned")]
    Poisoned,
}

/// Tenant-isolated key/value store for disposable read models.
///
/// `list` returns rows in first-insertion order; an upsert of an existing key
/// replaces the row in place and keeps its position.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), TenantStoreError>;
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Clear all read-model records for a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), TenantStoreError>;
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), TenantStoreError> {
        (**self).upsert(tenant_id, key, value)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), TenantStoreError> {
        (**self).clear_tenant(tenant_id)
    }
}

#[derive(Debug)]
struct TenantRows<K, V> {
    index: HashMap<K, usize>,
    rows: Vec<V>,
}

impl<K, V> Default for TenantRows<K, V> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            rows: Vec::new(),
        }
    }
}

/// In-memory tenant-isolated store.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<TenantId, TenantRows<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        let tenant = map.get(&tenant_id)?;
        tenant.index.get(key).and_then(|&i| tenant.rows.get(i)).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) -> Result<(), TenantStoreError> {
        let mut map = self.inner.write().map_err(|_| TenantStoreError::Poisoned)?;
        let tenant = map.entry(tenant_id).or_default();
        match tenant.index.get(&key) {
            Some(&i) => tenant.rows[i] = value,
            None => {
                tenant.index.insert(key, tenant.rows.len());
                tenant.rows.push(value);
            }
        }
        Ok(())
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        match self.inner.read() {
            Ok(map) => map.get(&tenant_id).map(|t| t.rows.clone()).unwrap_or_default(),
            Err(_) => vec![],
        }
    }

    fn clear_tenant(&self, tenant_id: TenantId) -> Result<(), TenantStoreError> {
        let mut map = self.inner.write().map_err(|_| TenantStoreError::Poisoned)?;
        map.remove(&tenant_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_keeps_first_insertion_order_across_updates() {
        let store: InMemoryTenantStore<u32, &'static str> = InMemoryTenantStore::new();
        let t = TenantId::new();

        store.upsert(t, 2, "b").unwrap();
        store.upsert(t, 1, "a").unwrap();
        store.upsert(t, 3, "c").unwrap();
        store.upsert(t, 2, "b2").unwrap();

        assert_eq!(store.list(t), vec!["b2", "a", "c"]);
        assert_eq!(store.get(t, &2), Some("b2"));
    }

    #[test]
    fn tenants_do_not_see_each_other() {
        let store: InMemoryTenantStore<u32, u32> = InMemoryTenantStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());

        store.upsert(a, 1, 10).unwrap();
        assert_eq!(store.get(b, &1), None);
        assert!(store.list(b).is_empty());

        store.clear_tenant(a).unwrap();
        assert!(store.list(a).is_empty());
    }

    #[test]
    fn writes_after_a_poisoned_lock_are_reported() {
        let store: Arc<InMemoryTenantStore<u32, u32>> = Arc::new(InMemoryTenantStore::new());
        let t = TenantId::new();

        let poisoner = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.write().unwrap();
            panic!("poison the read model lock");
        })
        .join();

        assert_eq!(store.upsert(t, 1, 10), Err(TenantStoreError::Poisoned));
        assert_eq!(store.clear_tenant(t), Err(TenantStoreError::Poisoned));
    }
}
