//! Large-file delivery
//!
//! Once extraction has produced a [`MediaArtifact`], the [`DeliveryResolver`]
//! decides whether it can be sent inline or whether the requester has to pick
//! between split parts and a direct link, and then drives that choice to
//! completion through a [`MessagingGateway`].

pub mod chunking;
pub mod context;
pub mod error;
pub mod gateway;
pub mod model;
pub mod resolver;

pub use chunking::{chunk_ranges, part_count, ByteRange, Chunk};
pub use context::{DeliveryContext, DeliveryState, FailureReason};
pub use error::DeliveryError;
pub use gateway::{AdminAlert, AlertSink, GatewayError, LinkProvider, MessagingGateway};
pub use model::{
    ChoicePrompt, DeliveryChoice, DeliveryPlan, DeliveryReport, DirectLink, DownloadRequest, MediaArtifact,
    MediaKind, OutgoingFile, PartInfo, PlatformLimits, Requester,
};
pub use resolver::{plan_delivery, DeliveryResolver};
