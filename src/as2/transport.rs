//! The transport seam to the external AS2/S-MIME codec.

use super::{As2ClientRequest, As2ClientResponse};
use crate::client::As2ClientSettings;

/// One AS2 connection capable of a synchronous exchange.
///
/// Implementations wrap an actual AS2 stack and are responsible for the
/// full S/MIME round trip: open a TLS-capable HTTP connection to the
/// receiver URL, MIME-pack the body, sign it with the sender's private
/// key from the key store using the configured algorithm, send, receive
/// the synchronous reply, parse it as an MDN (`multipart/signed` with a
/// PKCS#7 signature block), verify the MDN signature against the
/// receiver certificate, and verify that the reported MIC matches the
/// MIC computed over the outbound body with the algorithm advertised in
/// the disposition options. Every per-stage failure must be surfaced as
/// an attribute of the returned [`As2ClientResponse`], never as a panic,
/// so the orchestrator always gets a response to hand back.
pub trait As2Transport {
    /// Perform one synchronous send, blocking until the MDN arrives or a
    /// timeout elapses.
    fn send_synchronous(
        &self,
        settings: &As2ClientSettings,
        request: As2ClientRequest,
    ) -> As2ClientResponse;
}

/// Creates transports for the sending pipeline.
///
/// A fresh transport is requested per send, mirroring one-builder-per-
/// send on the client side; factories may pool connections internally.
pub trait As2TransportFactory {
    /// Create a transport for one exchange.
    fn create_transport(&self) -> Box<dyn As2Transport>;
}

/// Observer for the raw outgoing HTTP exchange.
pub trait HttpOutgoingDumper: Send {
    /// Called once with the final headers and signed body.
    fn dump_outgoing(&mut self, headers: &[(String, String)], body: &[u8]);
}

/// Creates one [`HttpOutgoingDumper`] per outgoing message.
pub trait HttpOutgoingDumperFactory: Send + Sync {
    /// Create a dumper for the next message.
    fn create_dumper(&self) -> Box<dyn HttpOutgoingDumper>;
}

/// Observer for raw incoming HTTP traffic (responses and inbound
/// requests). A single shared instance observes all messages.
pub trait HttpIncomingDumper: Send + Sync {
    /// Called once per received message with headers and body.
    fn dump_incoming(&self, headers: &[(String, String)], body: &[u8]);
}
