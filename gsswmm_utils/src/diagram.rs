//! Mermaid flowcharts of a model's drainage network.
//!
//! Subcatchments drain into their outlet nodes; conduits, orifices, weirs and pumps connect
//! nodes. Node shapes tell junctions, storage units and outfalls apart.

use crate::inp::InpSections;
use std::fmt::Write;

/// Replaces the characters Mermaid does not accept in node identifiers.
fn id(name: &str) -> String {
    name.replace(['-', '.', ' '], "_")
}

/// Renders the network of a parsed model as a fenced Mermaid `graph TD` block.
pub fn render(sections: &InpSections) -> String {
    let mut out = String::new();
    // writing to a String never fails
    let _ = write_diagram(sections, &mut out);
    out
}

fn write_diagram(sections: &InpSections, out: &mut String) -> std::fmt::Result {
    writeln!(out, "```mermaid")?;
    writeln!(out, "graph TD")?;
    writeln!(out, "    %% SWMM model structure")?;
    writeln!(out)?;

    // Name Raingage Outlet ...
    let subcatchments = sections.section("SUBCATCHMENTS");
    if !subcatchments.is_empty() {
        writeln!(out, "    %% Subcatchments")?;
        for subcatch in subcatchments.iter().filter(|s| s.len() >= 3) {
            let (name, outlet) = (&subcatch[0], &subcatch[2]);
            writeln!(out, "    {}[/{name}\\]", id(name))?;
            writeln!(out, "    {} -->|runoff| {}", id(name), id(outlet))?;
        }
        writeln!(out)?;
    }

    writeln!(out, "    %% Nodes")?;
    for name in sections.names("JUNCTIONS") {
        writeln!(out, "    {}([{name}])", id(name))?;
    }
    for name in sections.names("STORAGE") {
        writeln!(out, "    {}[({name})]", id(name))?;
    }
    for name in sections.names("OUTFALLS") {
        writeln!(out, "    {}[[\"{name}\"]]", id(name))?;
    }
    writeln!(out)?;

    let links = [
        ("CONDUITS", "Conduits", "-->", ""),
        ("ORIFICES", "Orifices", "-.->", "<br/>orifice"),
        ("WEIRS", "Weirs", "-.->", "<br/>weir"),
        ("PUMPS", "Pumps", "==>", "<br/>pump"),
    ];
    // Name From To ...
    for (section, title, arrow, label) in links {
        let lines = sections.section(section);
        if lines.is_empty() {
            continue;
        }
        writeln!(out, "    %% {title}")?;
        for link in lines.iter().filter(|l| l.len() >= 3) {
            writeln!(
                out,
                "    {} {arrow}|{}{label}| {}",
                id(&link[1]),
                link[0],
                id(&link[2])
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "    %% Styling")?;
    writeln!(out, "    classDef subcatchment fill:#e1f5e1,stroke:#4caf50,stroke-width:2px")?;
    writeln!(out, "    classDef storage fill:#fff3e0,stroke:#ff9800,stroke-width:2px")?;
    writeln!(out, "    classDef outfall fill:#e3f2fd,stroke:#2196f3,stroke-width:2px")?;
    writeln!(out, "    classDef junction fill:#f5f5f5,stroke:#757575,stroke-width:2px")?;
    writeln!(out)?;

    let classes = [
        ("SUBCATCHMENTS", "subcatchment"),
        ("STORAGE", "storage"),
        ("OUTFALLS", "outfall"),
        ("JUNCTIONS", "junction"),
    ];
    for (section, class) in classes {
        let ids: Vec<String> = sections.names(section).map(id).collect();
        if !ids.is_empty() {
            writeln!(out, "    class {} {class}", ids.join(","))?;
        }
    }
    write!(out, "```")
}
