//! Provider endpoint and wire-level names shared by the fetcher and parser.

pub const DEFAULT_PROVIDER_URL: &str =
    "https://www.clubdam.com/app/damtomo/scoring/GetScoringAiListXML.do";

/// Namespace of the scoring list document.
pub const SCORING_XML_NAMESPACE: &str =
    "https://www.clubdam.com/app/damtomo/scoring/GetScoringAiListXML";

pub const STATUS_OK: &str = "OK";

// Query parameter names
pub const PARAM_CARD_NO: &str = "cdmCardNo";
pub const PARAM_PAGE_NO: &str = "pageNo";
pub const PARAM_DETAIL_FLAG: &str = "detailFlg";

// Attribute names on <scoring>
pub const ATTR_CONTENTS_NAME: &str = "contentsName";
pub const ATTR_ARTIST_NAME: &str = "artistName";
pub const ATTR_SCORING_DATE_TIME: &str = "scoringDateTime";

// Session cookie names; the card number doubles as the request's card identifier
pub const COOKIE_UID: &str = "dam-uid";
pub const COOKIE_CARD_NO: &str = "scr_cdm";
pub const COOKIE_SCR_DT: &str = "scr_dt";
pub const COOKIE_WEBMEMBER: &str = "webmember";
pub const COOKIE_WM_AC: &str = "wm_ac";
pub const COOKIE_WM_DM: &str = "wm_dm";

/// Cookie name and the env var suffix it is read from, e.g. `U1_DAM_UID`.
pub const COOKIE_ENV_SUFFIXES: &[(&str, &str)] = &[
    (COOKIE_UID, "DAM_UID"),
    (COOKIE_CARD_NO, "SCR_CDM"),
    (COOKIE_SCR_DT, "SCR_DT"),
    (COOKIE_WM_AC, "WM_AC"),
    (COOKIE_WM_DM, "WM_DM"),
];

/// Provider scores are integers scaled by this factor.
pub const SCORE_SCALE: f64 = 1000.0;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 15;
pub const DEFAULT_MAX_PAGES: u32 = 30;
pub const DEFAULT_AVERAGE_PRECISION: u32 = 2;
pub const DEFAULT_HIGH_SCORE_THRESHOLD: f64 = 95.0;
pub const DEFAULT_LOW_PEAK_THRESHOLD: f64 = 80.0;
pub const DEFAULT_DATABASE_PATH: &str = "scores.db";
pub const DEFAULT_CONFIG_PATH: &str = "scoreboard.toml";

/// Top-N cut for each item's leaderboard.
pub const LEADERBOARD_DEPTH: usize = 3;
