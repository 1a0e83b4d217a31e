/// Control surface a tab holds on to for the transport attached to it.
///
/// The registry only keeps a weak reference to an implementor; the transport
/// itself is owned by whoever created it and may die independently.
pub trait TransportControl: Send + Sync {
    /// Tear the transport down and suppress any automatic reconnect.
    /// Must be idempotent.
    fn disconnect(&self);
}
