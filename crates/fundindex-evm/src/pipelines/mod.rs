//! The three crowdfunding pipelines.
//!
//! | Pipeline | Checkpoint name | Emitters | Dedup key |
//! |---|---|---|---|
//! | [`CampaignPipeline`] | `events` | platform | campaign address |
//! | [`FundsPipeline`] | `funds` | every known campaign | campaign address |
//! | [`TokenPipeline`] | `tokens` | platform | log identity |

pub mod campaigns;
pub mod funds;
pub mod tokens;

pub use campaigns::{CampaignPipeline, CampaignState, CampaignUniverse};
pub use funds::{FailedBatch, FundsEvent, FundsPipeline, FundsState};
pub use tokens::{TokenPipeline, TokenState};
