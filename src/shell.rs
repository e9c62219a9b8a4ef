//! Line-oriented interactive dashboard.

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::engine::{Completion, Dashboard, Slot};
use crate::error::{Result, WhosNextError};
use crate::generation::Disposition;
use crate::models::AttributeValue;
use crate::render;

const HELP: &str = "\
Commands:
  units                 list units and sub-categories
  unit +NAME | -NAME    select or deselect a unit
  role +NAME | -NAME    select or deselect a sub-category
  clear                 deselect everything
  search ID             look up an employee
  set ATTR=VALUE        what-if override for the found employee
  unset ATTR            drop an override
  predict [MODEL]       score the employee with overrides applied
  recommend             request retention recommendations (uses a credit)
  show                  print the whole dashboard
  help                  this text
  quit                  leave";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Units,
    Unit { name: String, on: bool },
    Role { name: String, on: bool },
    Clear,
    Search(String),
    Set { attribute: String, value: AttributeValue },
    Unset(String),
    Predict(Option<String>),
    Recommend,
    Show,
    Help,
    Quit,
}

fn toggle(arg: &str, command: &str) -> Result<(String, bool)> {
    let (on, name) = match arg.chars().next() {
        Some('+') => (true, &arg[1..]),
        Some('-') => (false, &arg[1..]),
        _ => {
            return Err(WhosNextError::invalid(format!(
                "usage: {} +NAME | -NAME",
                command
            )));
        }
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(WhosNextError::invalid(format!("usage: {} +NAME | -NAME", command)));
    }
    Ok((name.to_string(), on))
}

impl ShellCommand {
    /// Parse one input line. Blank lines are `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let command = match word.to_lowercase().as_str() {
            "units" => ShellCommand::Units,
            "unit" => {
                let (name, on) = toggle(rest, "unit")?;
                ShellCommand::Unit { name, on }
            }
            "role" => {
                let (name, on) = toggle(rest, "role")?;
                ShellCommand::Role { name, on }
            }
            "clear" => ShellCommand::Clear,
            "search" if !rest.is_empty() => ShellCommand::Search(rest.to_string()),
            "search" => return Err(WhosNextError::invalid("usage: search ID")),
            "set" => {
                let Some((attribute, value)) = rest.split_once('=') else {
                    return Err(WhosNextError::invalid("usage: set ATTR=VALUE"));
                };
                let attribute = attribute.trim();
                if attribute.is_empty() || value.trim().is_empty() {
                    return Err(WhosNextError::invalid("usage: set ATTR=VALUE"));
                }
                ShellCommand::Set {
                    attribute: attribute.to_string(),
                    value: AttributeValue::parse(value),
                }
            }
            "unset" if !rest.is_empty() => ShellCommand::Unset(rest.to_string()),
            "unset" => return Err(WhosNextError::invalid("usage: unset ATTR")),
            "predict" => ShellCommand::Predict((!rest.is_empty()).then(|| rest.to_string())),
            "recommend" => ShellCommand::Recommend,
            "show" => ShellCommand::Show,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            other => {
                return Err(WhosNextError::invalid(format!(
                    "unknown command '{}', try 'help'",
                    other
                )));
            }
        };
        Ok(Some(command))
    }
}

fn execute(dashboard: &mut Dashboard, command: ShellCommand) -> Result<()> {
    match command {
        ShellCommand::Units => {
            render::catalog_table(dashboard.filters().catalog(), Some(dashboard.filters().selection()))
                .printstd();
        }
        ShellCommand::Unit { name, on } => {
            dashboard.toggle_unit(&name, on)?;
            println!("{}", render::overview_status(dashboard.overview()));
        }
        ShellCommand::Role { name, on } => {
            if !on || dashboard.filters().is_allowed(&name) {
                dashboard.toggle_subcategory(&name, on);
            } else {
                println!("'{}' is not available for the selected units", name);
            }
            println!("{}", render::overview_status(dashboard.overview()));
        }
        ShellCommand::Clear => {
            dashboard.clear_filters();
            println!("{}", render::overview_status(dashboard.overview()));
        }
        ShellCommand::Search(id) => {
            dashboard.search(&id)?;
            println!("{}", render::lookup_status(dashboard.lookup().status()));
        }
        ShellCommand::Set { attribute, value } => {
            dashboard.set_override(&attribute, value)?;
            println!("override set; run 'predict' to rescore");
        }
        ShellCommand::Unset(attribute) => {
            if !dashboard.clear_override(&attribute) {
                println!("no override for '{}'", attribute);
            }
        }
        ShellCommand::Predict(model) => {
            dashboard.predict(model.as_deref())?;
            println!("scoring...");
        }
        ShellCommand::Recommend => {
            dashboard.recommend()?;
            println!("requesting recommendations...");
        }
        ShellCommand::Show => show(dashboard),
        ShellCommand::Help => println!("{}", HELP),
        ShellCommand::Quit => {}
    }
    Ok(())
}

fn show(dashboard: &Dashboard) {
    render::print_overview(dashboard.overview());
    println!("{}", render::lookup_status(dashboard.lookup().status()));
    if let Some(table) = render::profile_table(dashboard.lookup()) {
        table.printstd();
    }
    if let Some(prediction) = dashboard.workflow().prediction() {
        render::print_prediction(prediction);
    }
    if let Some(recommendations) = dashboard.workflow().recommendations() {
        render::print_recommendations(recommendations);
    }
    println!("{}", render::credits_line(dashboard.ledger()));
}

fn report(dashboard: &mut Dashboard, completion: Completion) {
    let slot = completion.slot();
    if dashboard.apply(completion) == Disposition::Discarded {
        return;
    }
    match slot {
        Slot::Overview => render::print_overview(dashboard.overview()),
        Slot::Lookup => {
            println!("{}", render::lookup_status(dashboard.lookup().status()));
            if let Some(table) = render::profile_table(dashboard.lookup()) {
                table.printstd();
            }
        }
        Slot::Prediction => match dashboard.workflow().prediction() {
            Some(prediction) => render::print_prediction(prediction),
            None => report_error(dashboard),
        },
        Slot::Recommendation => {
            match dashboard.workflow().recommendations() {
                Some(recommendations) => render::print_recommendations(recommendations),
                None => report_error(dashboard),
            }
            println!("{}", render::credits_line(dashboard.ledger()));
        }
    }
}

fn report_error(dashboard: &Dashboard) {
    if let Some(err) = dashboard.workflow().last_error() {
        println!("error: {}", err);
    }
}

/// Run the shell until `quit` or end of input.
pub async fn run(dashboard: &mut Dashboard) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);
    show(dashboard);

    loop {
        tokio::select! {
            completion = dashboard.next_completion(), if dashboard.in_flight() > 0 => {
                if let Some(completion) = completion {
                    report(dashboard, completion);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match ShellCommand::parse(&line) {
                    Ok(Some(ShellCommand::Quit)) => break,
                    Ok(Some(command)) => {
                        if let Err(err) = execute(dashboard, command) {
                            println!("error: {}", err);
                        }
                    }
                    Ok(None) => {}
                    Err(err) => println!("{}", err),
                }
            }
        }
    }
    Ok(())
}
