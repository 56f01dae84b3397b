//! Region inference from node display names.

/// Keyword table, checked in order; the first hit wins. More specific
/// entries come before short ambiguous ones ("russia" before "us").
const REGION_KEYWORDS: &[(&str, &[&str])] = &[
    ("Hong Kong", &["hk", "hong kong", "hongkong"]),
    ("Japan", &["jp", "japan", "tokyo"]),
    ("Singapore", &["sg", "singapore"]),
    ("Korea", &["kr", "korea", "seoul"]),
    ("Taiwan", &["tw", "taiwan"]),
    ("Canada", &["canada"]),
    ("UK", &["uk", "britain", "london"]),
    ("Germany", &["germany", "frankfurt"]),
    ("India", &["india", "mumbai"]),
    ("Russia", &["russia", "moscow"]),
    ("USA", &["us", "america", "usa"]),
];

pub fn infer_region(name: &str) -> String {
    let lower = name.to_lowercase();
    for (region, keywords) in REGION_KEYWORDS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return (*region).to_string();
        }
    }
    "Other".to_string()
}
