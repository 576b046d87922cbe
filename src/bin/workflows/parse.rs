use anyhow::{Context, Result};
use sylph_build::Package;

/// Split a comma-separated option value, dropping empty entries.
pub(crate) fn parse_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_packages(value: Option<&str>) -> Result<Vec<Package>> {
    parse_list(value)
        .iter()
        .map(|name| Package::parse(name).with_context(|| format!("parsing --package '{name}'")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_ignores_blank_entries() {
        assert_eq!(
            parse_list(Some("DEBUG_BUILD, ,FEATURE_X,")),
            vec!["DEBUG_BUILD".to_string(), "FEATURE_X".to_string()]
        );
        assert!(parse_list(None).is_empty());
    }

    #[test]
    fn packages_accept_cli_names() {
        assert_eq!(
            parse_packages(Some("kernel,app")).unwrap(),
            vec![Package::Kernel, Package::Apps]
        );
        assert!(parse_packages(Some("kernel,docs")).is_err());
    }
}
