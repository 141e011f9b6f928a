//! fundindex-evm — EVM log source, event decoding and the crowdfunding
//! pipelines built on `fundindex-core`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fundindex_core::{IndexerInstance, MemoryCheckpointStore};
//! use fundindex_evm::{CampaignPipeline, HttpLogSource, IndexerBuilder};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(HttpLogSource::new("http://localhost:8545", Duration::from_secs(30))?);
//! let store = Arc::new(MemoryCheckpointStore::new());
//! let campaigns = IndexerInstance::new(
//!     CampaignPipeline::new("0x5fbdb2315678afecb367f032d93f642f64180aa3"),
//!     IndexerBuilder::new().build_settings(),
//!     source,
//!     store,
//! );
//! campaigns.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod decoder;
pub mod facade;
pub mod pipelines;
pub mod records;
pub mod rpc;

pub use builder::IndexerBuilder;
pub use decoder::{DecodeError, EventDecoder, PlatformEvent};
pub use facade::QueryFacade;
pub use pipelines::{
    CampaignPipeline, CampaignState, CampaignUniverse, FailedBatch, FundsEvent, FundsPipeline,
    FundsState, TokenPipeline, TokenState,
};
pub use records::{CampaignRecord, FundsClaimRecord, TokenRecord};
pub use rpc::HttpLogSource;
