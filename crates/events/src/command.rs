use staydesk_core::AggregateId;

/// A command targets exactly one aggregate.
///
/// Commands are intent ("check this guest out"); events are the facts that
/// result once the aggregate accepts them. A command never spans two
/// aggregates, so each one is its own concurrency boundary: commands for
/// different guests can be handled fully in parallel.
///
/// Tenancy is not part of the command contract. The infrastructure layer
/// supplies the tenant and stamps it on every stored event.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
