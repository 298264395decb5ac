//! SourceBans sites and the ban records scraped from them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::SteamId;

macro_rules! sites {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Canonical short name of a community ban site.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Site {
            $($variant),+
        }

        impl Site {
            pub const ALL: &'static [Site] = &[$(Site::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Site::$variant => $name),+
                }
            }
        }

        impl FromStr for Site {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Site::$variant),)+
                    other => Err(AppError::validation(format!("unknown site: {other}"))),
                }
            }
        }
    };
}

sites! {
    Skial => "skial",
    Gfl => "gfl",
    Spaceship => "spaceship",
    Ugc => "ugc",
    SirPlease => "sirplease",
    Vidyagaems => "vidyagaems",
    Owl => "owl",
    ZmBrasil => "zmbrasil",
    Dixigame => "dixigame",
    ScrapTf => "scraptf",
    Wonderland => "wonderland",
    LazyPurple => "lazypurple",
    FirePowered => "firepowered",
    Harpoon => "harpoongaming",
    Panda => "panda",
    NeonHeights => "neonheights",
    Pancakes => "pancakes",
    Loos => "loos",
    PubsTf => "pubstf",
    ServiceTo => "serviceto",
    Bachuruservas => "bachuruservas",
    Bouncy => "bouncyball",
    FurryPound => "furrypound",
    RetroServers => "retroservers",
    SwapShop => "swapshop",
    Ecj => "ecj",
    JumpAcademy => "jumpacademy",
    CasualFun => "casualfun",
    SameTeem => "sameteem",
    PowerFps => "powerfps",
    SevenMau => "7mau",
    GhostCap => "ghostcap",
    Spectre => "spectre",
    DreamFire => "dreamfire",
    SetTeam => "setteam",
    BlueTeam => "blueteam",
    Grunt => "grunt",
    TriggerHappy => "triggerhappy",
    TakeTwo => "taketwo",
    EffectivelyCompetitive => "effectivelycompetitive",
    Crypto => "crypto",
    Tf2Ro => "tf2ro",
    Tawerna => "tawerna",
    TakeAim => "takeaim",
    Tf2Maps => "tf2maps",
    Petrol => "petrol",
    VaticanCity => "vaticancity",
    LazyNoob => "lazynoob",
    FluxTf => "fluxtf",
    DarkPyro => "darkpyro",
    Opst => "opst",
    GunServer => "gunserver",
    Sneaks => "sneaks",
    Nide => "nide",
    AstraMania => "astramania",
    GameSites => "gamesites",
    SgGaming => "sggaming",
    ApeMode => "apemode",
    MaxDb => "maxdb",
    SvDos => "svdos",
    Electric => "electric",
    Glory => "glory",
    SaveAScrap => "saveascrap",
    Rushy => "rushy",
    MoeVsMachine => "moevsmachine",
    Prwh => "prwh",
    Vortex => "vortex",
    KittyGaming => "kittygaming",
    Lunario => "lunario",
    Fear => "fear",
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted site row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbSite {
    pub site_id: i64,
    pub name: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// One ban as scraped from a listing page, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SbRecord {
    pub name: String,
    pub steam_id: SteamId,
    pub reason: String,
    pub created_on: DateTime<Utc>,
    /// Ban length in seconds; zero for permanent bans
    pub duration: i64,
    pub permanent: bool,
}

/// Persisted ban row, as returned to the read path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbBanRecord {
    pub ban_id: i64,
    pub site_id: i64,
    pub site_name: String,
    pub steam_id: SteamId,
    pub persona_name: String,
    pub reason: String,
    pub duration: i64,
    pub permanent: bool,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_names_round_trip() {
        for site in Site::ALL {
            assert_eq!(site.as_str().parse::<Site>().unwrap(), *site);
        }
        assert!("casualness".parse::<Site>().is_err());
    }

    #[test]
    fn site_names_are_unique() {
        let mut names: Vec<&str> = Site::ALL.iter().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Site::ALL.len());
    }
}
