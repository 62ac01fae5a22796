//! Authenticated HTTP client for the recruit platform API
//!
//! Wraps every API call with CSRF and session recovery:
//!
//! - `interceptor` attaches `X-CSRF-Token` to state-changing requests
//! - `classify` sorts failures into CSRF, session, auth-endpoint, network
//!   and other
//! - `queue` parks 401s behind a single session renewal
//! - `guard` turns an unrecoverable session into one login redirect
//! - `coordinator` runs the pipeline and owns login and logout
//!
//! Token fetching and storage live in the `csrf-token` crate.

pub mod classify;
pub mod coordinator;
pub mod error;
pub mod guard;
pub mod interceptor;
pub mod metrics;
pub mod queue;
pub mod request;
pub mod session;

pub use classify::{classify, is_auth_endpoint};
pub use coordinator::{SessionCoordinator, SessionState};
pub use error::{ApiError, ErrorCategory, FieldError, InitError, Result};
pub use guard::{GuardOutcome, Navigator, RecordingNavigator, SessionGuard};
pub use interceptor::{Decoration, RequestInterceptor, TokenSource};
pub use queue::{RenewalLease, RetryQueue, Ticket};
pub use request::{ApiRequest, ApiResponse, RetryMarkers};
