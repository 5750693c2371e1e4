pub mod inbound;
pub mod normalizer;

pub use inbound::{Attachment, AttachmentKind, EventBody, InboundEvent};
pub use normalizer::normalize;
