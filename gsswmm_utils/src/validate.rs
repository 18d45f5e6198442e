//! Structural checks of a model before its mapping is generated.
//!
//! Errors mark models that SWMM will refuse to run; warnings mark models that may not run as
//! intended. Checks cover the required sections, the nodes referenced by links and the
//! parameter counts of cross sections.

use crate::inp::InpSections;
use std::collections::HashSet;

/// Sections every runnable model is expected to have.
const REQUIRED_SECTIONS: [&str; 5] = [
    "OPTIONS",
    "RAINGAGES",
    "SUBCATCHMENTS",
    "SUBAREAS",
    "INFILTRATION",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => f.write_str("WARNING"),
            Self::Error => f.write_str("ERROR"),
        }
    }
}

/// A problem found in a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    fn warning<S: Into<String>>(message: S) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    fn error<S: Into<String>>(message: S) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

fn required_sections(sections: &InpSections, issues: &mut Vec<Issue>) {
    for section in REQUIRED_SECTIONS {
        if sections.section(section).is_empty() {
            issues.push(Issue::warning(format!(
                "missing or empty [{section}] section; the model may not run"
            )));
        }
    }
    if sections.section("OUTFALLS").is_empty() {
        issues.push(Issue::error(
            "no outfalls defined; SWMM requires at least one outlet node",
        ));
    }
}

fn node_references(sections: &InpSections, issues: &mut Vec<Issue>) {
    let nodes: HashSet<&str> = ["JUNCTIONS", "STORAGE", "OUTFALLS"]
        .iter()
        .flat_map(|s| sections.names(s))
        .collect();
    if nodes.is_empty() {
        issues.push(Issue::warning("no nodes defined in the model"));
        return;
    }

    // Name From To ...
    for (section, kind) in [("CONDUITS", "conduit"), ("ORIFICES", "orifice"), ("WEIRS", "weir")] {
        for link in sections.section(section) {
            if link.len() < 3 {
                continue;
            }
            for (end, node) in [("from", &link[1]), ("to", &link[2])] {
                if !nodes.contains(node.as_str()) {
                    issues.push(Issue::error(format!(
                        "{kind} '{}' references non-existent {end}-node '{node}'",
                        link[0]
                    )));
                }
            }
        }
    }
}

fn names<'a>(sections: &'a InpSections, section: &str) -> HashSet<&'a str> {
    sections.names(section).collect()
}

fn xsections(sections: &InpSections, issues: &mut Vec<Issue>) {
    let (conduits, orifices, weirs, pumps) = (
        names(sections, "CONDUITS"),
        names(sections, "ORIFICES"),
        names(sections, "WEIRS"),
        names(sections, "PUMPS"),
    );

    // Link Shape Geom1 Geom2 ...
    for xsection in sections.section("XSECTIONS") {
        if xsection.len() < 2 {
            continue;
        }
        let (link, shape) = (xsection[0].as_str(), xsection[1].as_str());
        if ![&conduits, &orifices, &weirs, &pumps]
            .iter()
            .any(|set| set.contains(link))
        {
            issues.push(Issue::warning(format!(
                "cross section for '{link}' but no such conduit, orifice, weir or pump"
            )));
            continue;
        }
        let params = xsection.len() - 2;
        let line = xsection.join(" ");

        if weirs.contains(link) && shape == "RECT_OPEN" {
            if params < 2 {
                issues.push(Issue::error(format!(
                    "weir '{link}' with RECT_OPEN needs at least 2 parameters (height, width), found {params} in '{line}'"
                )));
            } else if params == 3 {
                issues.push(Issue::error(format!(
                    "weir '{link}' with RECT_OPEN has 3 parameters but SWMM expects 2 or 4, in '{line}'"
                )));
            }
        }
        if orifices.contains(link) && shape == "CIRCULAR" && params < 1 {
            issues.push(Issue::error(format!(
                "orifice '{link}' with CIRCULAR needs a diameter, found {params} parameters"
            )));
        }
        if conduits.contains(link) {
            match shape {
                "CIRCULAR" if params < 1 => issues.push(Issue::error(format!(
                    "conduit '{link}' with CIRCULAR needs a diameter, found {params} parameters"
                ))),
                "RECT_OPEN" if params < 2 => issues.push(Issue::error(format!(
                    "conduit '{link}' with RECT_OPEN needs at least 2 parameters, found {params}"
                ))),
                _ => {}
            }
        }
    }
}

/// Checks a parsed model. Issues are returned in check order.
pub fn validate(sections: &InpSections) -> Vec<Issue> {
    let mut issues = Vec::new();
    required_sections(sections, &mut issues);
    node_references(sections, &mut issues);
    xsections(sections, &mut issues);
    issues
}

/// Returns `true` if any of `issues` is an error.
pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(Issue::is_error)
}
