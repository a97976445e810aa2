//! Page rendering infrastructure

mod cache;
mod request;
mod service;
mod state;
mod surface;
mod worker;

pub use cache::{CacheKey, SurfaceCache};
pub use request::{RenderParams, RenderRequest, RenderResponse, RequestGate, RequestId};
pub use service::{RenderConfig, RenderCoordinator, RenderEvent};
pub use state::{Command, Effect, RenderState, clamp_scale};
pub use surface::{PageSurface, RenderStatus};

/// Rasterized surfaces kept around for quick revisits
pub const DEFAULT_CACHE_SIZE: usize = 8;

/// Renders are cheap to supersede; one worker keeps them in request order
pub const DEFAULT_WORKERS: usize = 1;
