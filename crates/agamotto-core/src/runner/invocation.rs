//! Engine command-line rendering
//!
//! Substitutes scenario values into the configured argument template. A
//! placeholder with no value (no network file, empty closure set) drops its
//! argument, and the flag right before it when that flag starts with `-`.

use crate::config::EngineConfig;
use crate::types::Scenario;
use std::fmt;
use std::path::Path;

/// Fully rendered engine command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Per-invocation values beyond the scenario itself
#[derive(Debug, Clone, Copy)]
pub struct InvocationContext<'a> {
    /// Network file, if configured
    pub net_file: Option<&'a Path>,
    /// Route file, if configured
    pub route_file: Option<&'a Path>,
    /// Directory the engine writes into
    pub output_dir: &'a Path,
    /// Staged scenario descriptor
    pub scenario_file: &'a Path,
    /// Use the graphical build
    pub gui: bool,
    /// Step delay
    pub delay: u32,
}

/// Render the engine command for a scenario
#[must_use]
pub fn render(engine: &EngineConfig, scenario: &Scenario, ctx: &InvocationContext<'_>) -> Invocation {
    let closures = (!scenario.closures.is_empty()).then(|| scenario.closures.joined(","));
    let values: [(&str, Option<String>); 10] = [
        ("{config}", Some(scenario.config_path.display().to_string())),
        ("{net}", ctx.net_file.map(|p| p.display().to_string())),
        ("{routes}", ctx.route_file.map(|p| p.display().to_string())),
        ("{closures}", closures),
        ("{aware}", Some(scenario.weight.aware.to_string())),
        ("{unaware}", Some(scenario.weight.unaware.to_string())),
        ("{output}", Some(ctx.output_dir.display().to_string())),
        ("{scenario_file}", Some(ctx.scenario_file.display().to_string())),
        ("{index}", Some(scenario.index.to_string())),
        ("{delay}", Some(ctx.delay.to_string())),
    ];

    let mut args: Vec<String> = Vec::with_capacity(engine.args.len());
    for template in &engine.args {
        match substitute(template, &values) {
            Some(arg) => args.push(arg),
            None => {
                if args.last().is_some_and(|prev| prev.starts_with('-')) {
                    args.pop();
                }
            }
        }
    }

    let program = if ctx.gui {
        engine.gui_program.clone()
    } else {
        engine.program.clone()
    };

    Invocation { program, args }
}

/// `None` if the template references a placeholder without a value
///
/// The template is scanned once; substituted text is never rescanned.
fn substitute(template: &str, values: &[(&str, Option<String>)]) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        for (key, value) in values {
            if let Some(after) = tail.strip_prefix(key) {
                out.push_str(value.as_deref()?);
                rest = after;
                continue 'scan;
            }
        }
        out.push('{');
        rest = &tail[1..];
    }
    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClosureSet, ScenarioIndex, WeightPair};
    use std::path::PathBuf;

    fn scenario(closures: &[&str]) -> Scenario {
        Scenario {
            index: ScenarioIndex(4),
            closures: ClosureSet::parse(closures).unwrap(),
            weight: WeightPair::new(70, 30).unwrap(),
            config_path: PathBuf::from("/cfg/city.sumocfg"),
            output_dir: PathBuf::from("/runs/r/output/4"),
        }
    }

    fn ctx<'a>(out: &'a Path, file: &'a Path, net: Option<&'a Path>, gui: bool) -> InvocationContext<'a> {
        InvocationContext {
            net_file: net,
            route_file: None,
            output_dir: out,
            scenario_file: file,
            gui,
            delay: if gui { 3 } else { 0 },
        }
    }

    #[test]
    fn renders_default_template() {
        let engine = EngineConfig::default();
        let s = scenario(&["E1", "E2"]);
        let file = s.output_dir.join("scenario.json");
        let inv = render(&engine, &s, &ctx(&s.output_dir, &file, Some(Path::new("/cfg/city.net.xml")), false));

        assert_eq!(inv.program, "agamotto-engine");
        assert_eq!(
            inv.args,
            vec![
                "-c", "/cfg/city.sumocfg",
                "--net-file", "/cfg/city.net.xml",
                "--close", "E1,E2",
                "--weights", "70:30",
                "--output-dir", "/runs/r/output/4",
                "--scenario", "/runs/r/output/4/scenario.json",
                "--delay", "0",
            ]
        );
    }

    #[test]
    fn gui_selects_graphical_program() {
        let engine = EngineConfig::default();
        let s = scenario(&["E1"]);
        let file = s.output_dir.join("scenario.json");
        let inv = render(&engine, &s, &ctx(&s.output_dir, &file, None, true));

        assert_eq!(inv.program, "agamotto-engine-gui");
        assert_eq!(inv.args.last().map(String::as_str), Some("3"));
    }

    #[test]
    fn baseline_drops_close_flag() {
        let engine = EngineConfig::default();
        let s = scenario(&[]);
        let file = s.output_dir.join("scenario.json");
        let inv = render(&engine, &s, &ctx(&s.output_dir, &file, None, false));

        assert!(!inv.args.iter().any(|a| a == "--close"));
        assert!(!inv.args.iter().any(|a| a == "--net-file"));
        assert!(inv.args.iter().any(|a| a == "--weights"));
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let engine = EngineConfig {
            program: "/bin/sh".to_string(),
            args: vec!["{closures}".into(), "{config}@{index}".into(), "{unknown}".into()],
            ..EngineConfig::default()
        };
        let mut s = scenario(&["E{index}", "{output}"]);
        s.config_path = PathBuf::from("/cfg/{aware}.sumocfg");
        let file = s.output_dir.join("scenario.json");
        let inv = render(&engine, &s, &ctx(&s.output_dir, &file, None, false));

        assert_eq!(
            inv.args,
            vec!["E{index},{output}", "/cfg/{aware}.sumocfg@4", "{unknown}"]
        );
    }

    #[test]
    fn custom_template_with_positional_values() {
        let engine = EngineConfig {
            program: "/bin/sh".to_string(),
            args: vec!["run.sh".into(), "{output}".into(), "{aware}".into(), "{index}".into()],
            ..EngineConfig::default()
        };
        let s = scenario(&["E1"]);
        let file = s.output_dir.join("scenario.json");
        let inv = render(&engine, &s, &ctx(&s.output_dir, &file, None, false));

        assert_eq!(inv.to_string(), "/bin/sh run.sh /runs/r/output/4 70 4");
    }
}
