//! CLI transport over applet trees.
//!
//! Each Command extension's tree renders into a clap subcommand tree:
//! children become subcommands, declared parameters become `--flags`
//! (with their single-character abbreviations), and a parse walks back
//! into the selector path plus raw values the shared dispatcher expects.
//! Declared defaults and required checks stay in the binding layer so the
//! CLI and HTTP transports resolve parameters identically.

pub mod config;
pub mod cron;
pub mod serve;

use std::collections::BTreeMap;

use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Map, Value};

use steward_kit::{Node, Outcome, ParamKind, Parameter};

/// Attaches one subcommand per command root to the base parser.
pub fn build_cli(base: Command, roots: &BTreeMap<String, Node>) -> Command {
    let mut cli = base;
    for (name, node) in roots {
        cli = cli.subcommand(subcommand_from_node(name, node));
    }
    cli
}

fn subcommand_from_node(name: &str, node: &Node) -> Command {
    let mut command = Command::new(name.to_owned()).about(node.help().to_owned());
    for parameter in node.parameters() {
        command = command.arg(arg_from_parameter(parameter));
    }
    for (child_name, child) in node.children() {
        command = command.subcommand(subcommand_from_node(child_name, child));
    }
    command
}

fn arg_from_parameter(parameter: &Parameter) -> Arg {
    let mut arg = Arg::new(parameter.name().to_owned())
        .long(parameter.name().replace('_', "-"))
        .help(parameter.help_text().to_owned());
    if let Some(abbr) = parameter.abbr_char() {
        arg = arg.short(abbr);
    }
    match parameter.param_kind() {
        ParamKind::Bool => arg.action(ArgAction::SetTrue),
        _ => arg.action(ArgAction::Set),
    }
}

/// Walks the parsed matches back into `(selector path, raw values)`.
///
/// Raw values are the strings the user actually passed; defaults and
/// required checks are left to the binding layer.
pub fn collect_invocation(root: &Node, matches: &ArgMatches) -> (Vec<String>, Map<String, Value>) {
    let mut selectors = Vec::new();
    let mut node = root;
    let mut current = matches;
    while let Some((child_name, child_matches)) = current.subcommand() {
        match node.descend(&[child_name]) {
            Some(child) => {
                selectors.push(child_name.to_owned());
                node = child;
                current = child_matches;
            }
            None => break,
        }
    }

    let mut raw = Map::new();
    for parameter in node.parameters() {
        match parameter.param_kind() {
            ParamKind::Bool => {
                if current.get_flag(parameter.name()) {
                    raw.insert(parameter.name().to_owned(), Value::Bool(true));
                }
            }
            _ => {
                if let Some(value) = current.get_one::<String>(parameter.name()) {
                    raw.insert(parameter.name().to_owned(), Value::String(value.clone()));
                }
            }
        }
    }
    (selectors, raw)
}

/// Prints an outcome: nothing, the scalar as-is, or `key: value` lines.
pub fn render_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::None => {}
        Outcome::Scalar(value) => println!("{}", render_value(value)),
        Outcome::Mapping(mapping) => {
            for (key, value) in mapping {
                println!("{key}: {}", render_value(value));
            }
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Settings and state values cross into outcomes as JSON.
pub fn yaml_to_json(value: &serde_yaml::Value) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn music_tree() -> Node {
        let play = Node::new("Play something")
            .parameter(Parameter::new("what").unwrap().required())
            .unwrap()
            .parameter(
                Parameter::new("dry-run")
                    .unwrap()
                    .kind(ParamKind::Bool)
                    .default_value(false),
            )
            .unwrap()
            .handler(|_| Ok(Outcome::None));
        Node::new("Music control").child("play", play).unwrap()
    }

    #[test]
    fn tree_renders_children_as_subcommands_with_flags() {
        let mut roots = BTreeMap::new();
        roots.insert("music".to_owned(), music_tree());
        let cli = build_cli(Command::new("steward"), &roots);

        let matches = cli
            .try_get_matches_from(["steward", "music", "play", "--what", "jazz", "--dry-run"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "music");

        let (selectors, raw) = collect_invocation(roots.get("music").unwrap(), sub);
        assert_eq!(selectors, ["play"]);
        assert_eq!(raw.get("what"), Some(&json!("jazz")));
        assert_eq!(raw.get("dry_run"), Some(&json!(true)));
    }

    #[test]
    fn omitted_flags_stay_out_of_the_raw_values() {
        let mut roots = BTreeMap::new();
        roots.insert("music".to_owned(), music_tree());
        let cli = build_cli(Command::new("steward"), &roots);

        let matches = cli
            .try_get_matches_from(["steward", "music", "play", "--what", "jazz"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let (_, raw) = collect_invocation(roots.get("music").unwrap(), sub);
        assert!(!raw.contains_key("dry_run"));
    }

    #[test]
    fn no_subcommand_selects_the_root_node() {
        let mut roots = BTreeMap::new();
        roots.insert("music".to_owned(), music_tree());
        let cli = build_cli(Command::new("steward"), &roots);

        let matches = cli.try_get_matches_from(["steward", "music"]).unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let (selectors, raw) = collect_invocation(roots.get("music").unwrap(), sub);
        assert!(selectors.is_empty());
        assert!(raw.is_empty());
    }

    #[test]
    fn short_flags_render_from_abbreviations() {
        let node = Node::new("crop")
            .parameter(Parameter::new("type").unwrap().abbr('t').unwrap())
            .unwrap()
            .handler(|_| Ok(Outcome::None));
        let mut roots = BTreeMap::new();
        roots.insert("crop".to_owned(), node);

        let cli = build_cli(Command::new("steward"), &roots);
        let matches = cli
            .try_get_matches_from(["steward", "crop", "-t", "podcast"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let (_, raw) = collect_invocation(roots.get("crop").unwrap(), sub);
        assert_eq!(raw.get("type"), Some(&json!("podcast")));
    }
}
