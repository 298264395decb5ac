//! Catalogue of known SourceBans installs.

use std::time::Duration;

use super::SiteProfile;
use super::parsers::{
    next_fluent, next_nav_first, next_nav_last, next_page_param, parse_default, parse_fluent,
    parse_material, parse_star, require_reason, skip_lifted,
};
use super::time::{
    parse_day_first_short, parse_default as time_default, parse_dotted, parse_skial,
    parse_trailing_year, parse_verbose, parse_wonderland,
};
use crate::models::Site;

const BANLIST: &str = "/index.php?p=banlist";

/// Stock template with first-link pagination and ISO timestamps.
const fn stock(site: Site, base_url: &'static str) -> SiteProfile {
    SiteProfile {
        site,
        base_url,
        start_path: BANLIST,
        row_parser: parse_default,
        next_url: next_nav_first,
        time_parser: time_default,
        row_filter: None,
        sleep_between_pages: None,
    }
}

pub const SKIAL: SiteProfile = SiteProfile {
    time_parser: parse_skial,
    next_url: next_nav_last,
    ..stock(Site::Skial, "https://www.skial.com/sourcebans")
};
pub const GFL: SiteProfile = SiteProfile {
    row_parser: parse_fluent,
    next_url: next_fluent,
    ..stock(Site::Gfl, "https://sourcebans.gflclan.com")
};
pub const SPACESHIP: SiteProfile = SiteProfile {
    time_parser: parse_day_first_short,
    ..stock(Site::Spaceship, "https://sappho.io/bans")
};
pub const UGC: SiteProfile = stock(Site::Ugc, "https://sb.ugc-gaming.net");
pub const SIR_PLEASE: SiteProfile = SiteProfile {
    row_parser: parse_material,
    ..stock(Site::SirPlease, "https://sirplease.gg/sourcebans")
};
pub const VIDYAGAEMS: SiteProfile = SiteProfile {
    time_parser: parse_trailing_year,
    ..stock(Site::Vidyagaems, "https://www.vidyagaems.net/sourcebans")
};
pub const OWL: SiteProfile = SiteProfile {
    row_parser: parse_fluent,
    next_url: next_fluent,
    ..stock(Site::Owl, "https://kingpandagamer.xyz/sb")
};
pub const ZM_BRASIL: SiteProfile = SiteProfile {
    time_parser: parse_trailing_year,
    ..stock(Site::ZmBrasil, "http://bans.zmbrasil.com.br")
};
pub const DIXIGAME: SiteProfile = stock(Site::Dixigame, "https://dixigame.com/bans");
pub const SCRAP_TF: SiteProfile = SiteProfile {
    time_parser: parse_verbose,
    ..stock(Site::ScrapTf, "https://bans.scrap.tf")
};
pub const WONDERLAND: SiteProfile = SiteProfile {
    time_parser: parse_wonderland,
    row_parser: parse_star,
    ..stock(Site::Wonderland, "https://bans.wonderland.tf")
};
pub const LAZY_PURPLE: SiteProfile = SiteProfile {
    row_parser: parse_fluent,
    next_url: next_fluent,
    ..stock(Site::LazyPurple, "https://www.lazypurple.com/sourcebans")
};
pub const FIRE_POWERED: SiteProfile = SiteProfile {
    row_filter: Some(skip_lifted),
    ..stock(Site::FirePowered, "https://firepoweredgaming.com/sourcebanspp")
};
pub const HARPOON: SiteProfile = stock(Site::Harpoon, "https://bans.harpoongaming.com");
pub const PANDA: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::Panda, "https://bans.panda-community.com")
};
pub const NEON_HEIGHTS: SiteProfile = stock(Site::NeonHeights, "https://neonheights.xyz/bans");
pub const PANCAKES: SiteProfile = SiteProfile {
    row_parser: parse_star,
    ..stock(Site::Pancakes, "https://pancakes.tf/bans")
};
pub const LOOS: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::Loos, "https://looscommunity.com/bans")
};
pub const PUBS_TF: SiteProfile = stock(Site::PubsTf, "https://bans.pubs.tf");
pub const SERVICE_TO: SiteProfile = stock(Site::ServiceTo, "https://sourcebans.service.to");
pub const BACHURUSERVAS: SiteProfile = SiteProfile {
    time_parser: parse_trailing_year,
    ..stock(Site::Bachuruservas, "https://bachuruservas.lt/sb")
};
pub const BOUNCY: SiteProfile = stock(Site::Bouncy, "https://www.bouncyball.eu/bans");
pub const FURRY_POUND: SiteProfile = SiteProfile {
    row_parser: parse_material,
    ..stock(Site::FurryPound, "https://bans.furrypound.net")
};
pub const RETRO_SERVERS: SiteProfile = stock(Site::RetroServers, "https://bans.retroservers.net");
pub const SWAP_SHOP: SiteProfile = SiteProfile {
    row_filter: Some(require_reason),
    ..stock(Site::SwapShop, "http://tf2swapshop.com/sourcebans")
};
pub const ECJ: SiteProfile = stock(Site::Ecj, "https://ecj.tf/sourcebans");
pub const JUMP_ACADEMY: SiteProfile = SiteProfile {
    row_parser: parse_fluent,
    next_url: next_fluent,
    ..stock(Site::JumpAcademy, "https://bans.jumpacademy.tf")
};
pub const CASUAL_FUN: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::CasualFun, "https://tf2-casual-fun.de/sourcebans")
};
pub const SAME_TEEM: SiteProfile = stock(Site::SameTeem, "https://sameteem.com/sourcebans");
pub const POWER_FPS: SiteProfile = stock(Site::PowerFps, "https://powerfps.com/bans");
pub const SEVEN_MAU: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::SevenMau, "https://7-mau.com/server/sb")
};
pub const GHOST_CAP: SiteProfile = stock(Site::GhostCap, "https://sourcebans.ghostcap.com");
pub const SPECTRE: SiteProfile = stock(Site::Spectre, "https://spectre.gg/bans");
pub const DREAM_FIRE: SiteProfile = stock(Site::DreamFire, "https://dreamfire.fr/sourcebans");
pub const SET_TEAM: SiteProfile = SiteProfile {
    time_parser: parse_trailing_year,
    ..stock(Site::SetTeam, "https://sourcebans.setteam.net")
};
pub const BLUE_TEAM: SiteProfile = stock(Site::BlueTeam, "https://bans.blueteamgaming.com");
pub const GRUNT: SiteProfile = stock(Site::Grunt, "https://grunt.tf/bans");
/// Served through a caching proxy that strips the nav links and
/// rate limits aggressively.
pub const TRIGGER_HAPPY: SiteProfile = SiteProfile {
    next_url: next_page_param,
    sleep_between_pages: Some(Duration::from_secs(10)),
    ..stock(Site::TriggerHappy, "https://triggerhappygamers.com/sourcebans")
};
pub const TAKE_TWO: SiteProfile = stock(Site::TakeTwo, "https://bans.take2.co.za");
pub const EFFECTIVELY_COMPETITIVE: SiteProfile =
    stock(Site::EffectivelyCompetitive, "https://bans.effectivelycompetitive.com");
pub const CRYPTO: SiteProfile = stock(Site::Crypto, "https://bans.cryptogaming.org");
pub const TF2_RO: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::Tf2Ro, "https://tf2ro.ro/sourcebans")
};
pub const TAWERNA: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::Tawerna, "https://sb.tawerna.tf")
};
pub const TAKE_AIM: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::TakeAim, "https://takeaim.cz/sb")
};
pub const TF2_MAPS: SiteProfile = stock(Site::Tf2Maps, "https://bans.tf2maps.net");
pub const PETROL: SiteProfile = SiteProfile {
    row_parser: parse_fluent,
    next_url: next_fluent,
    ..stock(Site::Petrol, "https://petrol.tf/sb")
};
pub const VATICAN_CITY: SiteProfile =
    stock(Site::VaticanCity, "https://www.the-vaticancity.com/sourcebans");
pub const LAZY_NOOB: SiteProfile = stock(Site::LazyNoob, "https://sourcebans.lazynoob.network");
pub const FLUX_TF: SiteProfile = SiteProfile {
    row_parser: parse_fluent,
    next_url: next_fluent,
    ..stock(Site::FluxTf, "https://bans.flux.tf")
};
pub const DARK_PYRO: SiteProfile = stock(Site::DarkPyro, "https://bans.darkpyrogaming.com");
pub const OPST: SiteProfile = SiteProfile {
    row_parser: parse_material,
    ..stock(Site::Opst, "https://bans.opstm.com")
};
pub const GUN_SERVER: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::GunServer, "https://gunserver.ru/sourcebans")
};
pub const SNEAKS: SiteProfile = stock(Site::Sneaks, "https://bans.snksrv.com");
pub const NIDE: SiteProfile = SiteProfile {
    row_parser: parse_star,
    ..stock(Site::Nide, "https://bans.nide.gg")
};
pub const ASTRA_MANIA: SiteProfile = SiteProfile {
    time_parser: parse_trailing_year,
    ..stock(Site::AstraMania, "https://astramania.ro/sban2")
};
pub const GAME_SITES: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::GameSites, "https://bans.gamesites.cz")
};
pub const SG_GAMING: SiteProfile = stock(Site::SgGaming, "https://bans.sg-gaming.net");
pub const APE_MODE: SiteProfile = stock(Site::ApeMode, "https://sourcebans.apemode.tf");
pub const MAX_DB: SiteProfile = SiteProfile {
    time_parser: parse_verbose,
    ..stock(Site::MaxDb, "https://bans.maxdb.net")
};
pub const SV_DOS: SiteProfile = stock(Site::SvDos, "https://bans.svdos.com");
pub const ELECTRIC: SiteProfile = stock(Site::Electric, "https://bans.electric.gg");
pub const GLORY: SiteProfile = stock(Site::Glory, "https://glorygamers.co.uk/sourcebans");
pub const SAVE_A_SCRAP: SiteProfile = stock(Site::SaveAScrap, "https://bans.saveascrap.com");
pub const RUSHY: SiteProfile = SiteProfile {
    row_parser: parse_fluent,
    next_url: next_fluent,
    ..stock(Site::Rushy, "https://bans.rushyservers.com")
};
pub const MOE_VS_MACHINE: SiteProfile = SiteProfile {
    row_parser: parse_star,
    ..stock(Site::MoeVsMachine, "https://moevsmachine.tf/bans")
};
pub const PRWH: SiteProfile = SiteProfile {
    time_parser: parse_dotted,
    ..stock(Site::Prwh, "https://sourcebans.prwh.de")
};
pub const VORTEX: SiteProfile = SiteProfile {
    time_parser: parse_trailing_year,
    ..stock(Site::Vortex, "https://vortex.oyunhost.net/sourcebans")
};
pub const KITTY_GAMING: SiteProfile = stock(Site::KittyGaming, "https://bans.kittygaming.xyz");
pub const LUNARIO: SiteProfile = SiteProfile {
    row_parser: parse_material,
    ..stock(Site::Lunario, "https://sb.lunario.tf")
};
pub const FEAR: SiteProfile = stock(Site::Fear, "https://fearhq.com/sourcebans");

const ALL: &[SiteProfile] = &[
    SKIAL,
    GFL,
    SPACESHIP,
    UGC,
    SIR_PLEASE,
    VIDYAGAEMS,
    OWL,
    ZM_BRASIL,
    DIXIGAME,
    SCRAP_TF,
    WONDERLAND,
    LAZY_PURPLE,
    FIRE_POWERED,
    HARPOON,
    PANDA,
    NEON_HEIGHTS,
    PANCAKES,
    LOOS,
    PUBS_TF,
    SERVICE_TO,
    BACHURUSERVAS,
    BOUNCY,
    FURRY_POUND,
    RETRO_SERVERS,
    SWAP_SHOP,
    ECJ,
    JUMP_ACADEMY,
    CASUAL_FUN,
    SAME_TEEM,
    POWER_FPS,
    SEVEN_MAU,
    GHOST_CAP,
    SPECTRE,
    DREAM_FIRE,
    SET_TEAM,
    BLUE_TEAM,
    GRUNT,
    TRIGGER_HAPPY,
    TAKE_TWO,
    EFFECTIVELY_COMPETITIVE,
    CRYPTO,
    TF2_RO,
    TAWERNA,
    TAKE_AIM,
    TF2_MAPS,
    PETROL,
    VATICAN_CITY,
    LAZY_NOOB,
    FLUX_TF,
    DARK_PYRO,
    OPST,
    GUN_SERVER,
    SNEAKS,
    NIDE,
    ASTRA_MANIA,
    GAME_SITES,
    SG_GAMING,
    APE_MODE,
    MAX_DB,
    SV_DOS,
    ELECTRIC,
    GLORY,
    SAVE_A_SCRAP,
    RUSHY,
    MOE_VS_MACHINE,
    PRWH,
    VORTEX,
    KITTY_GAMING,
    LUNARIO,
    FEAR,
];

/// Every known site, in a stable order.
pub fn all_profiles() -> &'static [SiteProfile] {
    ALL
}

pub fn profile_for(site: Site) -> Option<&'static SiteProfile> {
    ALL.iter().find(|p| p.site == site)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_site_has_a_profile() {
        for site in Site::ALL {
            assert!(profile_for(*site).is_some(), "{site}");
        }
        assert_eq!(all_profiles().len(), Site::ALL.len());
        assert_eq!(all_profiles().len(), 70);
    }

    #[test]
    fn one_profile_per_site() {
        let mut sites: Vec<Site> = all_profiles().iter().map(|p| p.site).collect();
        sites.sort();
        sites.dedup();
        assert_eq!(sites.len(), all_profiles().len());
    }

    #[test]
    fn start_urls_parse() {
        for profile in all_profiles() {
            let url = profile.start_url().unwrap();
            assert!(url.as_str().contains("p=banlist"), "{}", profile.site);
        }
    }

    #[test]
    fn trigger_happy_has_floor() {
        assert_eq!(
            TRIGGER_HAPPY.sleep_between_pages,
            Some(Duration::from_secs(10))
        );
        assert!(SKIAL.sleep_between_pages.is_none());
    }
}
