//! Threaded comment view-model: an in-memory comment tree with optimistic,
//! server-confirmed mutations and client-side ordering.

pub mod config;
pub mod events;
pub mod gateway;
pub mod model;
pub mod sorter;
pub mod store;
pub mod transformer;
pub mod view_model;

pub use config::{load_options, CommentsContext, CommentsOptions, FieldMapping, MappingError};
pub use events::{CommentEvent, EventBus, EventKind, MutationPhase, Subscription};
pub use gateway::{CommentSource, GatewayError, MutationGateway, MutationKind, OfflineGateway};
pub use model::{Attachment, Comment, MediaKind, WireOrigin};
pub use sorter::CommentSorter;
pub use store::CommentStore;
pub use transformer::{CommentTransformer, TransformError};
pub use view_model::{
    CommentEdit, CommentViewModel, MutationOutcome, NewComment, PendingMutation, ValidationError,
};
