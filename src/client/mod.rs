//! The AS2 sending pipeline.
//!
//! [`As2ClientBuilder`] collects everything one Peppol AS2 exchange
//! needs, fills gaps from an SMP lookup, verifies the whole parameter
//! set, wraps the business document in an SBD, and drives the transport.
//! One builder per send; the terminal send methods consume the builder.

mod builder;
mod error;
mod message_id;
mod settings;

pub use builder::{As2ClientBuilder, BusinessPayload, DerivationStep, SelectedProfileAction};
pub use error::As2ClientBuilderError;
pub use message_id::{expand_message_id, MessageIdError};
pub use settings::{
    As2ClientSettings, ReceiverSettings, SenderSettings, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_READ_TIMEOUT,
};

/// Default AS2 subject.
pub const DEFAULT_AS2_SUBJECT: &str = "Peppol AS2 message";

/// Default AS2 message-id template.
pub const DEFAULT_MESSAGE_ID_FORMAT: &str =
    "OpenPEPPOL-$date.ddMMyyyyHHmmssZ$-$rand.1234$@$msg.sender.as2_id$_$msg.receiver.as2_id$";

/// Prefix of Peppol v3 AP certificate common names ("P" + country code).
pub const APP_PREFIX_V3: &str = "P";

/// Default MIME type of the payload body part.
pub const DEFAULT_MIME_TYPE: &str = "application/xml";
