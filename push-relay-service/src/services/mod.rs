pub mod dispatch;
pub mod identity;
pub mod metrics;
pub mod providers;

pub use dispatch::{dispatch, validate, MAX_BATCH_SIZE};
pub use identity::{
    GoogleIdentityVerifier, IdentityClaims, IdentityVerifier, MockIdentityVerifier, VerifyError,
};
pub use metrics::{get_metrics, init_metrics, record_dispatch, record_provider_call};
pub use providers::{
    BatchOutcome, FcmProvider, MockPushProvider, ProviderError, ProviderResponse, PushProvider,
};
