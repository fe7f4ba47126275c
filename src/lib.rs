//! # peppol-as2
//!
//! Peppol AS2 document exchange: the sending pipeline around an SMP
//! lookup, SBDH envelope construction, and synchronous AS2 transmission
//! with a signed MDN, plus the inbound side that unwraps received
//! messages and dispatches their SBD payload.
//!
//! The raw AS2/S-MIME codec is deliberately not part of this crate; it
//! is consumed through the [`as2::As2Transport`] and
//! [`server::As2MessageDecoder`] seams so that any S/MIME stack can be
//! plugged in. Everything around those seams lives here: parameter
//! derivation, SMP-driven endpoint and certificate discovery,
//! certificate checking, payload validation, SBD assembly, and the
//! settings and MDN disposition wiring.
//!
//! ## Sending
//!
//! ```no_run
//! use peppol_as2::as2::{As2ClientResponse, As2Transport, As2TransportFactory};
//! use peppol_as2::client::{As2ClientBuilder, As2ClientSettings};
//! use peppol_as2::identifier::{
//!     DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier,
//! };
//! use peppol_as2::keystore::{KeyStoreConfig, KeyStoreType};
//!
//! // Wraps whatever AS2/S-MIME stack the application uses.
//! struct MyTransport;
//!
//! impl As2Transport for MyTransport {
//!     fn send_synchronous(
//!         &self,
//!         _settings: &As2ClientSettings,
//!         _request: peppol_as2::as2::As2ClientRequest,
//!     ) -> As2ClientResponse {
//!         As2ClientResponse::default()
//!     }
//! }
//!
//! struct MyFactory;
//!
//! impl As2TransportFactory for MyFactory {
//!     fn create_transport(&self) -> Box<dyn As2Transport> {
//!         Box::new(MyTransport)
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let response = As2ClientBuilder::new()
//!         .key_store(KeyStoreConfig::from_file(KeyStoreType::Pkcs12, "ap.p12", "secret"))
//!         .sender_as2_id("POP000001")
//!         .sender_as2_email("peppol@example.org")
//!         .peppol_sender_id(ParticipantIdentifier::with_default_scheme("9915:sender"))
//!         .peppol_receiver_id(ParticipantIdentifier::with_default_scheme("9915:receiver"))
//!         .peppol_document_type_id(DocumentTypeIdentifier::with_default_scheme(
//!             "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2::Invoice",
//!         ))
//!         .peppol_process_id(ProcessIdentifier::with_default_scheme(
//!             "urn:www.cenbii.eu:profile:bii04:ver1.0",
//!         ))
//!         // Receiver URL, certificate, and AS2 id come from the SMP:
//!         .smp_client(Box::new(peppol_as2::smp::SmpHttpClient::new(
//!             "http://smp.example.org",
//!         )?))
//!         .business_document_file("invoice.xml")
//!         .as2_transport_factory(Box::new(MyFactory))
//!         .send_synchronous()?;
//!
//!     println!("MDN received: {}", response.has_mdn());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `smp-http` (default) | Blocking HTTP SMP client |
//! | `server` (default) | Inbound AS2 handling |

pub mod as2;
pub mod cert;
pub mod client;
pub mod handlers;
pub mod identifier;
pub mod keystore;
pub mod sbdh;
pub mod smp;
pub mod validate;
pub mod xml;

#[cfg(feature = "server")]
pub mod server;

pub use client::{As2ClientBuilder, As2ClientBuilderError};
pub use identifier::{
    DocumentTypeIdentifier, ParticipantIdentifier, ProcessIdentifier, TransportProfile,
};
