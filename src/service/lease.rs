use crate::error::DbCredError;
use crate::types::LeaseRequest;
use std::future::Future;

/// The host's lease subsystem, seen from the engine: it takes the internal
/// data and TTL of a freshly issued secret and returns an opaque lease id.
pub trait LeaseRegistrar: Send + Sync {
    fn register(
        &self,
        request: &LeaseRequest,
    ) -> impl Future<Output = Result<String, DbCredError>> + Send;
}
