//! Constants module for the 9Anime resolver
//!
//! Contains endpoint URL builders that use the base URL from configuration.

use crate::models::Section;

/// URL builder functions for all endpoints
pub mod endpoints {
    use super::Section;

    /// Home widget URL without the page number
    pub fn home_widget(base_url: &str, section: Section) -> String {
        format!("{}/ajax/home/widget/{}?page=", base_url, section.slug())
    }

    /// Quick search dropdown URL
    pub fn quick_search(base_url: &str, query: &str, vrf: &str) -> String {
        format!(
            "{}/ajax/anime/search?keyword={}&vrf={}",
            base_url,
            urlencoding::encode(query),
            vrf
        )
    }

    /// Filter page URL
    pub fn search(base_url: &str, query: &str, vrf: &str) -> String {
        format!(
            "{}/filter?keyword={}&vrf={}&page=1",
            base_url,
            urlencoding::encode(query),
            vrf
        )
    }

    /// Episode-list fragment for a series id
    pub fn episode_list(base_url: &str, id: &str, vrf: &str) -> String {
        format!("{}/ajax/episode/list/{}?vrf={}", base_url, id, vrf)
    }
}

/// Mirror server ids
pub mod mirrors {
    pub const VIDSTREAM: &str = "41";

    /// Referer the Mcloud host expects on manifest requests
    pub const MCLOUD_REFERER: &str = "https://mcloud.to/";
}

pub mod defaults {
    pub const BASE_URL: &str = "https://9anime.id";
    pub const LEGACY_ORIGIN: &str = "https://9anime.to";
    pub const VRF_ENTRY: &str = "vrf";
    pub const PLAYER_ENTRY: &str = "resolvePlayer";

    /// Location of the client bundle on the site
    pub fn script_url(base_url: &str) -> String {
        format!("{}/assets/mix/all.js", base_url)
    }
}
