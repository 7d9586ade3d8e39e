use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// OASIS TAC area name, as used in `tac_area_name` and the TAC_AREA_NAME column
pub type TacAreaCode = &'static str;

/// Represents a CAISO transmission access charge area
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TacArea {
    pub code: TacAreaCode,
    pub name: &'static str,
    pub utility: Option<&'static str>, // Participating transmission owner
}

impl TacArea {
    pub const fn new(code: TacAreaCode, name: &'static str, utility: Option<&'static str>) -> Self {
        Self {
            code,
            name,
            utility,
        }
    }
}

/// TAC areas published by OASIS load reports, keyed by code
pub static TAC_AREAS: Lazy<HashMap<TacAreaCode, TacArea>> = Lazy::new(|| {
    let areas = vec![
        TacArea::new("CA ISO-TAC", "CAISO total", None),
        TacArea::new("PGE-TAC", "Pacific Gas & Electric", Some("PG&E")),
        TacArea::new("SCE-TAC", "Southern California Edison", Some("SCE")),
        TacArea::new("SDGE-TAC", "San Diego Gas & Electric", Some("SDG&E")),
        TacArea::new("VEA-TAC", "Valley Electric Association", Some("VEA")),
    ];

    areas.into_iter().map(|area| (area.code, area)).collect()
});

/// Look up a TAC area by its OASIS code
pub fn get_tac_area(code: &str) -> Option<&'static TacArea> {
    TAC_AREAS.get(code)
}

/// All known TAC areas, sorted by code
pub fn list_tac_areas() -> Vec<&'static TacArea> {
    let mut areas: Vec<_> = TAC_AREAS.values().collect();
    areas.sort_by_key(|area| area.code);
    areas
}

impl std::fmt::Display for TacArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.utility {
            Some(utility) => write!(f, "{} ({}) - {}", self.name, self.code, utility),
            None => write!(f, "{} ({})", self.name, self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oasis::DEFAULT_TAC_AREA;

    #[test]
    fn test_default_area_is_known() {
        let area = get_tac_area(DEFAULT_TAC_AREA).unwrap();
        assert_eq!(area.utility, Some("PG&E"));
        assert_eq!(area.to_string(), "Pacific Gas & Electric (PGE-TAC) - PG&E");
    }

    #[test]
    fn test_list_is_sorted() {
        let codes: Vec<_> = list_tac_areas().iter().map(|a| a.code).collect();
        assert_eq!(
            codes,
            vec!["CA ISO-TAC", "PGE-TAC", "SCE-TAC", "SDGE-TAC", "VEA-TAC"]
        );
        assert!(get_tac_area("NOPE-TAC").is_none());
    }
}
