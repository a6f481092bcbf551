#![deny(
    clippy::mutable_key_type,
    clippy::map_entry,
    clippy::boxed_local,
    clippy::let_unit_value,
    clippy::redundant_allocation,
    clippy::bool_comparison,
    clippy::bind_instead_of_map,
    clippy::vec_box,
    clippy::while_let_loop,
    clippy::useless_asref,
    clippy::repeat_once,
    clippy::deref_addrof,
    clippy::suspicious_map,
    clippy::arc_with_non_send_sync,
    clippy::single_char_pattern,
    clippy::for_kv_map,
    clippy::let_and_return,
    clippy::iter_nth,
    clippy::iter_cloned_collect,
    clippy::bytes_nth,
    clippy::match_result_ok,
    clippy::cmp_owned,
    clippy::cmp_null,
    clippy::op_ref
)]

//! Hotspot aggregation for the city heatmap: clustering of scored observations,
//! density tiers, event correlation and the selection / refresh state behind the
//! map view.

pub mod api_client;
pub mod clustering;
pub mod config;
pub mod correlation;
pub mod density;
pub mod display;
pub mod geo_math;
pub mod models;
pub mod regions;
pub mod refresh;
pub mod selection;
pub mod session;

pub use api_client::{FetchError, HeatmapApi, HttpHeatmapClient};
pub use clustering::{HotspotCluster, merge_hotspots};
pub use config::EngineConfig;
pub use density::{DensityTier, classify};
pub use models::{Event, HeatmapMode, QueryParameters};
pub use session::MapSession;
