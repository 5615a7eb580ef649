//! Parsing of dry-run upgrade reports into candidate package names.
//!
//! Both parsers are best-effort: they are fed whatever text the check
//! command produced, even when it exited with an error.

use crate::distro::PackageFamily;

const APT_UPGRADE_HEADER: &str = "The following packages will be upgraded";
const APT_SUMMARY_WORD: &str = "upgraded";

/// Candidate packages in report order, or `None` when the report says
/// nothing can be upgraded.
pub fn parse_candidates(family: PackageFamily, report: &str) -> Option<Vec<String>> {
    let candidates = match family {
        PackageFamily::Apt => parse_apt(report)?,
        PackageFamily::Yum => parse_yum(report),
    };
    (!candidates.is_empty()).then_some(candidates)
}

/// `apt-get -s upgrade`: names follow the "will be upgraded:" header and
/// run until the "N upgraded, M newly installed" summary.
fn parse_apt(report: &str) -> Option<Vec<String>> {
    let header = report.find(APT_UPGRADE_HEADER)?;
    let start = report[header..]
        .find('\n')
        .map(|offset| header + offset)
        .unwrap_or(report.len());

    let section = &report[start..];
    match section.find(APT_SUMMARY_WORD) {
        Some(end) => {
            let mut names: Vec<String> =
                section[..end].split_whitespace().map(str::to_string).collect();
            // the summary's leading count ("3 upgraded") sits before the word
            names.pop();
            Some(names)
        }
        None => Some(section.split_whitespace().map(str::to_string).collect()),
    }
}

/// `yum check-update`: one `name.arch  version  repo` line per update,
/// until a blank line or the "Obsoleting Packages" section.
fn parse_yum(report: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut in_list = false;

    for line in report.lines() {
        if line.trim().is_empty() {
            if in_list {
                break;
            }
            continue;
        }
        if line.starts_with("Obsoleting") {
            break;
        }
        // wrapped continuation lines start with whitespace
        if line.starts_with(char::is_whitespace) {
            continue;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        // plugin chatter has no `name.arch` first column
        let Some((name, _arch)) = fields[0].rsplit_once('.') else {
            continue;
        };
        names.push(name.to_string());
        in_list = true;
    }

    names
}
