//! `nhi-agent interactive`: readline question loop.

use nhi_domain::config::Config;

use super::ask::{analyzer_for, print_panel};
use super::ReportArgs;

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "q"];

fn is_exit(line: &str) -> bool {
    EXIT_WORDS.contains(&line.to_lowercase().as_str())
}

pub async fn run(config: &Config, source: ReportArgs) -> anyhow::Result<()> {
    let analyzer = analyzer_for(config, &source)?;

    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".nhi-agent")
        .join("history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("Interactive Q&A Mode");
    eprintln!("Enter questions about the identities. Type 'exit' or 'quit' to exit.\n");

    loop {
        match rl.readline("Question: ") {
            Ok(line) => {
                let question = line.trim();
                if is_exit(question) {
                    break;
                }
                if question.is_empty() {
                    continue;
                }
                rl.add_history_entry(question).ok();

                eprintln!("Analyzing...");
                match analyzer.ask_question(question, source.model.as_deref()).await {
                    Ok(answer) => print_panel("Answer", &answer),
                    Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Type 'exit' or press Ctrl+D to quit)");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    eprintln!("Goodbye!");
    Ok(())
}
