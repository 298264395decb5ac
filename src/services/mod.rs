//! Clients for every remote source.
//!
//! - SourceBans sites (`sourcebans`), one HTML engine driven by site profiles
//! - Steam Web API (`steam`)
//! - League APIs (`rgl`, `etf2l`)
//! - logs.tf match pages (`logstf`)
//! - Bot detector lists (`bdlist`) and the serveme.tf ban CSV (`serveme`)

pub mod bdlist;
pub mod etf2l;
pub mod logstf;
pub mod rgl;
pub mod serveme;
pub mod sourcebans;
pub mod steam;

pub use bdlist::BdListClient;
pub use etf2l::Etf2lClient;
pub use logstf::LogsTfClient;
pub use rgl::RglClient;
pub use serveme::ServemeClient;
pub use sourcebans::{BanSink, SiteProfile, SourceBansScraper};
pub use steam::{SteamApi, SteamClient};
