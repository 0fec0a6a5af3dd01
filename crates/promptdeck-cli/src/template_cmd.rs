//! `promptdeck template` commands: run the template engine offline.

use std::collections::BTreeMap;

use anyhow::{Context, Result};

use promptdeck_core::template::{ResolvedPrompt, VariableForm, extract_variables, humanize, resolve_prompt};

use crate::TemplateCommands;

pub fn run_template_command(command: TemplateCommands) -> Result<()> {
    match command {
        TemplateCommands::Vars { template } => {
            let variables = extract_variables(&template);
            if variables.is_empty() {
                println!("No variables.");
            }
            for key in variables {
                println!("{key}\t{}", humanize(&key));
            }
        }
        TemplateCommands::Render { template, vars, raw } => {
            let bindings = parse_bindings(&vars)?;
            let resolved = render(&template, &bindings, raw.as_deref())?;
            if resolved.fell_back {
                eprintln!("note: unresolved placeholders, showing raw text");
            }
            println!("{}", resolved.text);
        }
    }
    Ok(())
}

/// Parse `key=value` pairs. Later pairs win.
pub fn parse_bindings(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("expected key=value, got {pair:?}"))?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("empty variable name in {pair:?}");
            }
            Ok((key.to_owned(), value.to_owned()))
        })
        .collect()
}

/// Check every variable has a value, then substitute. `raw` defaults to
/// the template itself.
pub fn render(template: &str, bindings: &BTreeMap<String, String>, raw: Option<&str>) -> Result<ResolvedPrompt> {
    let mut form = VariableForm::new(template);
    form.apply(bindings);
    let bindings = form.submit()?;
    Ok(resolve_prompt(template, &bindings, raw.unwrap_or(template)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_bindings_splits_on_first_equals() {
        let bindings = parse_bindings(&pairs(&["goal=lose weight", "eq=a=b", "goal=run"])).unwrap();
        assert_eq!(bindings["goal"], "run");
        assert_eq!(bindings["eq"], "a=b");
    }

    #[test]
    fn parse_bindings_rejects_malformed_pairs() {
        assert!(parse_bindings(&pairs(&["novalue"])).is_err());
        assert!(parse_bindings(&pairs(&["=value"])).is_err());
    }

    #[test]
    fn render_substitutes_all_variables() {
        let bindings = parse_bindings(&pairs(&["goal=lose weight"])).unwrap();
        let resolved = render("Plan for {goal}", &bindings, None).unwrap();
        assert_eq!(resolved.text, "Plan for lose weight");
        assert!(!resolved.fell_back);
    }

    #[test]
    fn render_reports_missing_variables() {
        let err = render("{a} and {b}", &BTreeMap::new(), None).unwrap_err();
        assert_eq!(err.to_string(), "missing values for: a, b");
    }

    #[test]
    fn render_falls_back_to_raw_text_on_leftover_braces() {
        let bindings = parse_bindings(&pairs(&["name={other}"])).unwrap();
        let resolved = render("Hi {name}", &bindings, Some("Hi there")).unwrap();
        assert_eq!(resolved.text, "Hi there");
        assert!(resolved.fell_back);
    }
}
