//! Canonical feature → category mapping
//!
//! Spreadsheet headers are free text; this table assigns each known feature
//! to a display category. Lookups compare slugs, so spacing and punctuation
//! differences in a header still find their category.

use exintel_common::naming::slugify;

/// Category every unmapped feature falls into
pub const DEFAULT_CATEGORY: &str = "Products";

/// Display category with its canonical position and icon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalCategory {
    pub name: &'static str,
    pub sort_order: i64,
    pub icon: &'static str,
}

pub const CATEGORIES: &[CanonicalCategory] = &[
    CanonicalCategory { name: "Platform", sort_order: 1, icon: "monitor" },
    CanonicalCategory { name: "Authentication", sort_order: 2, icon: "key" },
    CanonicalCategory { name: "Trading", sort_order: 3, icon: "candlestick-chart" },
    CanonicalCategory { name: "Earn", sort_order: 4, icon: "piggy-bank" },
    CanonicalCategory { name: "Ecosystem", sort_order: 5, icon: "globe" },
    CanonicalCategory { name: "Growth", sort_order: 6, icon: "trending-up" },
    CanonicalCategory { name: "Products", sort_order: 7, icon: "package" },
];

const FEATURE_CATEGORIES: &[(&str, &str)] = &[
    ("web app", "Platform"),
    ("mobile app", "Platform"),
    ("corporate registration", "Platform"),
    ("public api", "Platform"),
    ("api management", "Platform"),
    ("sign up with bank", "Authentication"),
    ("sign in with bank", "Authentication"),
    ("sign in with passkey", "Authentication"),
    ("sign in with gmail", "Authentication"),
    ("sign in with apple", "Authentication"),
    ("sign in with telegram", "Authentication"),
    ("login with qr", "Authentication"),
    ("copy trading", "Trading"),
    ("tradebots for users", "Trading"),
    ("convert", "Trading"),
    ("convert small amounts", "Trading"),
    ("price alarm", "Trading"),
    ("ai sentimentals", "Trading"),
    ("locked staking", "Earn"),
    ("flexible staking", "Earn"),
    ("dual investment", "Earn"),
    ("on chain earn", "Earn"),
    ("try nemalandirma", "Earn"),
    ("auto-invest (dca)", "Earn"),
    ("loan borrowing", "Earn"),
    ("own stablecoin", "Ecosystem"),
    ("own chain", "Ecosystem"),
    ("own card", "Ecosystem"),
    ("crypto as a service", "Ecosystem"),
    ("stocks and commodity", "Ecosystem"),
    ("global customers", "Ecosystem"),
    ("referral", "Growth"),
    ("affiliate (kol program)", "Growth"),
    ("academy for logged in users", "Growth"),
    ("gamification", "Growth"),
    ("social feed", "Growth"),
    ("nft/marketplace", "Products"),
    ("fan token", "Products"),
    ("launchpool/pad", "Products"),
    ("pay (payments)", "Products"),
    ("on ramp off ramp (3rd party)", "Products"),
];

/// Category name for a feature header, `Products` when unmapped
pub fn category_for_feature(feature_name: &str) -> &'static str {
    let slug = slugify(feature_name);
    FEATURE_CATEGORIES
        .iter()
        .find(|(known, _)| slugify(known) == slug)
        .map(|(_, category)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}

/// Canonical sort order and icon for a category name, if it is one of ours
pub fn canonical_category(name: &str) -> Option<&'static CanonicalCategory> {
    CATEGORIES.iter().find(|c| c.name == name)
}
