use dbd_workbench::console::Prompter;
use dbd_workbench::fs_utils::{DecisionFn, WriteDecision};
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Prompter reading answers from stdin
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&mut self, question: &str) -> dbd_workbench::Result<Option<String>> {
        print!("{} ", question);
        io::stdout().flush()?;

        let mut answer = String::new();
        // End of input abandons the flow like an empty answer
        if io::stdin().lock().read_line(&mut answer)? == 0 {
            return Ok(None);
        }
        let answer = answer.trim().to_string();
        Ok(if answer.is_empty() { None } else { Some(answer) })
    }
}

/// Overwrite decision asked on the terminal for every existing target
pub fn overwrite_decision() -> DecisionFn {
    Box::new(|path: &Path| -> dbd_workbench::Result<WriteDecision> {
        let mut prompter = StdinPrompter;
        loop {
            let question = format!(
                "{} already exists. [a]ccept existing, [r]eject, [o]verwrite?",
                path.display()
            );
            let decision = match prompter.ask(&question)?.as_deref().map(str::to_ascii_lowercase) {
                None => return Ok(WriteDecision::Reject),
                Some(answer) => match answer.as_str() {
                    "a" | "accept" => WriteDecision::Accept,
                    "r" | "reject" => WriteDecision::Reject,
                    "o" | "overwrite" => WriteDecision::Overwrite,
                    _ => {
                        println!("Please answer a, r or o.");
                        continue;
                    }
                },
            };
            return Ok(decision);
        }
    })
}
