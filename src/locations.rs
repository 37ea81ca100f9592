/// Locations that always appear in target data: the 50 states, the District of
/// Columbia and Puerto Rico. Maintained by hand; never derived from observed
/// sequences, since a location with zero sequences still gets zero-filled rows.
pub const LOCATIONS: [(&str, &str); 52] = [
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("DC", "Washington DC"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("PR", "Puerto Rico"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

pub fn abbreviations() -> Vec<String> {
    LOCATIONS.iter().map(|(abbr, _)| abbr.to_string()).collect()
}

/// Map a location as reported in sequence metadata (postal code or full name)
/// onto its postal code. Returns `None` for anything outside the table.
pub fn normalize(raw: &str) -> Option<&'static str> {
    let raw = raw.trim();
    LOCATIONS
        .iter()
        .find(|(abbr, name)| abbr.eq_ignore_ascii_case(raw) || name.eq_ignore_ascii_case(raw))
        .map(|(abbr, _)| *abbr)
        .or(match raw {
            "District of Columbia" | "Washington D.C." => Some("DC"),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn table_has_fifty_two_unique_codes() {
        let codes: HashSet<&str> = LOCATIONS.iter().map(|(abbr, _)| *abbr).collect();
        assert_eq!(codes.len(), 52);
        assert!(codes.contains("DC"));
        assert!(codes.contains("PR"));
    }

    #[test]
    fn normalizes_names_and_codes() {
        assert_eq!(normalize("Massachusetts"), Some("MA"));
        assert_eq!(normalize("ma"), Some("MA"));
        assert_eq!(normalize("District of Columbia"), Some("DC"));
        assert_eq!(normalize("Guam"), None);
    }
}
