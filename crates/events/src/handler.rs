/// Execute an aggregate command in place (no IO).
///
/// Decides with `handle`, then applies each resulting event. Useful in tests
/// and anywhere the persistence pipeline of the dispatcher is not wanted.
///
/// On error the aggregate is left untouched.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: staydesk_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
