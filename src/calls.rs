//! Well-known fields and table names of the call dataset
//!
//! Field names follow the upstream export (spaces already replaced with
//! underscores). If the export layout changes, this is the one place to
//! update.

/// Unique case identifier
pub const CASE_ID: &str = "CaseID";
/// Event timestamp; the export sometimes delivers it blank or as text
pub const START_DATE: &str = "Case_Details_StartDate";
/// Caller postal code; auto-detected numeric by import, corrected to text
pub const ZIP: &str = "Caller_Info_CallerZip";
/// Caller county name
pub const COUNTY: &str = "Caller_Info_CallerCounty";
/// Caller state code
pub const STATE: &str = "Caller_Info_CallerState_Text";
/// Substance category description
pub const CATEGORY: &str = "Major_Category_MajorCatDescription";

/// Counties reported as "Unknown"/"UNK" start with this prefix after
/// title-casing and are dropped during cleaning
pub const UNKNOWN_COUNTY_PREFIX: &str = "U";

/// Per-county daily call count on the county reference table
pub const NUM_TODAY: &str = "Num_Today";
/// County name field on the county reference table
pub const COUNTY_REF_NAME: &str = "NAME10";

// Intermediate batch tables, one per run
pub const TABLE_NEW: &str = "calls_new";
pub const TABLE_NEW_TODAY: &str = "calls_new_today";
pub const TABLE_NEW_IN_STATE: &str = "calls_new_in_state";
pub const TABLE_NEW_GEO: &str = "calls_new_geo";
pub const TABLE_TODAY_UNIQUE: &str = "calls_today_unique";
pub const TABLE_TODAY_BY_COUNTY: &str = "calls_today_by_county";

// Derived views rebuilt every run
pub const TABLE_THIS_MONTH: &str = "calls_this_month";
pub const TABLE_THIS_DAY: &str = "calls_this_day";
pub const TABLE_THIS_HOUR: &str = "calls_this_hour";

/// County polygon reference set (never deleted by retention)
pub const TABLE_COUNTY_REF: &str = "county_ref";

/// Monthly master tables are named `calls_<YYYYMM>`
pub const MONTH_TABLE_PREFIX: &str = "calls_";

pub fn month_table_name(month_key: &str) -> String {
    format!("{}{}", MONTH_TABLE_PREFIX, month_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_table_name() {
        assert_eq!(month_table_name("201501"), "calls_201501");
    }
}
