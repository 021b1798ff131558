//! Request data injected into every resolver via `Context::data()`.

/// Opaque credentials forwarded by the calling client.
///
/// Present only when the client supplied them; read with
/// `ctx.data_opt::<Credentials>()`. The bus layer never inspects them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials(pub String);

/// Where the current request came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRequestInfo {
    /// Service name the server was started with.
    pub service: String,
    /// Subject the request arrived on.
    pub subject: String,
}
