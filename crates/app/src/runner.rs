//! Interactive terminal loop around a `SessionController`.

use async_trait::async_trait;
use learn_core::ItemPhase;
use learn_core::model::{MediaUri, SessionMode};
use services::{
    Advance, AudioError, AudioPlayer, CompletionOutcome, CompletionReport, RetainReason,
    SessionController, SessionEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Announces clips on stdout instead of playing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleAudio;

#[async_trait]
impl AudioPlayer for ConsoleAudio {
    async fn play(&self, uri: &MediaUri) -> Result<(), AudioError> {
        println!("  ♪ {uri}");
        Ok(())
    }

    fn stop(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Answer(String),
    Next,
    Prev,
    Jump(usize),
    Clue,
    Restart,
    Note(Option<String>),
    Finish,
    Exit,
    Help,
}

impl Command {
    /// Parse one input line. Lines not starting with `:` are answers.
    ///
    /// # Errors
    ///
    /// Returns a message for unknown commands or a bad `:jump` argument.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(':') else {
            return Ok(Self::Answer(line.to_string()));
        };
        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(n, a)| (n, a.trim()));
        match name {
            "next" | "n" => Ok(Self::Next),
            "prev" | "p" => Ok(Self::Prev),
            "jump" | "j" => arg
                .parse::<usize>()
                .ok()
                .filter(|n| *n >= 1)
                .map(|n| Self::Jump(n - 1))
                .ok_or_else(|| format!("usage: :jump <1-based item number>, got {arg:?}")),
            "clue" | "c" => Ok(Self::Clue),
            "restart" | "r" => Ok(Self::Restart),
            "note" => Ok(Self::Note((!arg.is_empty()).then(|| arg.to_string()))),
            "finish" => Ok(Self::Finish),
            "exit" | "quit" | "q" => Ok(Self::Exit),
            "help" | "h" | "?" => Ok(Self::Help),
            other => Err(format!("unknown command :{other} (try :help)")),
        }
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Drive `controller` from stdin until the session completes or the
/// learner exits.
///
/// # Errors
///
/// Returns an error only if stdin cannot be read.
pub async fn run(mut controller: SessionController) -> Result<(), std::io::Error> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "{} · {} mode · {} items{}",
        controller.lesson().title(),
        controller.mode(),
        controller.state().item_count(),
        if controller.was_resumed() { " (resumed)" } else { "" }
    );
    print_help();
    show_item(&controller);

    loop {
        tokio::select! {
            event = controller.next_event() => match event {
                Some(SessionEvent::PhaseChanged { phase, .. }) => show_phase(&controller, phase),
                Some(SessionEvent::Tick { .. }) => {}
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    controller.close();
                    break;
                };
                if let Flow::Stop = handle_line(&mut controller, &line).await {
                    break;
                }
            }
        }
    }
    Ok(())
}

async fn handle_line(controller: &mut SessionController, line: &str) -> Flow {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(message) => {
            println!("! {message}");
            return Flow::Continue;
        }
    };

    match command {
        Command::Answer(text) if text.is_empty() => {}
        Command::Answer(text) => match controller.submit_answer(&text) {
            Ok(feedback) => {
                let p = &feedback.progress;
                println!(
                    "  {} · {}/{} points · {}",
                    p.grade().as_str(),
                    p.points_earned(),
                    p.max_points(),
                    p.score_letter()
                );
                if !feedback.match_result.is_exact_match {
                    if let Some(closest) = &feedback.match_result.closest_answer {
                        println!("  expected: {closest}");
                    }
                }
            }
            Err(e) => println!("! {e}"),
        },
        Command::Next => match controller.advance().await {
            Ok(Advance::Moved(_)) => show_item(controller),
            Ok(Advance::Completed(report)) => {
                show_report(&report);
                return Flow::Stop;
            }
            Err(e) => println!("! {e}"),
        },
        Command::Prev => match controller.previous() {
            Ok(_) => show_item(controller),
            Err(e) => println!("! {e}"),
        },
        Command::Jump(index) => match controller.jump_to(index) {
            Ok(()) => show_item(controller),
            Err(e) => println!("! {e}"),
        },
        Command::Clue => match controller.reveal_clue() {
            Ok(_) => show_test_hint(controller),
            Err(e) => println!("! {e}"),
        },
        Command::Restart => match controller.restart_current() {
            Ok(()) => show_item(controller),
            Err(e) => println!("! {e}"),
        },
        Command::Note(note) => match controller.edit_note(note) {
            Ok(()) => println!("  note saved"),
            Err(e) => println!("! {e}"),
        },
        Command::Finish => match controller.finish().await {
            Ok(report) => {
                show_report(&report);
                return Flow::Stop;
            }
            Err(e) => println!("! {e}"),
        },
        Command::Exit => {
            controller.close();
            println!("progress saved; run again to resume");
            return Flow::Stop;
        }
        Command::Help => print_help(),
    }
    Flow::Continue
}

fn print_help() {
    println!("commands: <answer> :next :prev :jump N :clue :restart :note TEXT :finish :exit");
}

fn show_item(controller: &SessionController) {
    let item = controller.current_item();
    println!();
    println!(
        "[{}/{}] {}",
        controller.current_index() + 1,
        controller.state().item_count(),
        item.prompt()
    );
    match controller.mode() {
        SessionMode::Study => {}
        SessionMode::Test => {
            if let Some(progress) = controller.current_progress() {
                println!(
                    "  answered: {} ({})",
                    progress.user_answer(),
                    progress.score_letter()
                );
                show_test_hint(controller);
            } else {
                println!("  hints left: {}", controller.hints_remaining());
            }
        }
    }
}

fn show_phase(controller: &SessionController, phase: ItemPhase) {
    let item = controller.current_item();
    match phase {
        ItemPhase::RevealFirst => {}
        ItemPhase::RevealSecond => {
            if let Some(answer) = item.accepted_answers().first() {
                println!("  = {answer}");
            }
        }
        ItemPhase::ShowTrigger => {
            if let Some(text) = &item.hint().text {
                println!("  hint: {text}");
            }
            if let Some(image) = &item.hint().image {
                println!("  image: {image}");
            }
        }
        ItemPhase::ShowInput => match controller.current_progress() {
            Some(progress) => println!("  already answered: {}", progress.user_answer()),
            None => println!("  type your answer:"),
        },
        ItemPhase::ShowFeedback => {}
    }
}

fn show_test_hint(controller: &SessionController) {
    let hint = controller.current_item().hint();
    let visible = controller.hint_visibility();
    if visible.image {
        match &hint.image {
            Some(image) => println!("  image: {image}"),
            None => println!("  image: (none)"),
        }
    }
    if visible.text {
        if let Some(text) = &hint.text {
            println!("  hint: {text}");
        }
    }
}

fn show_report(report: &CompletionReport) {
    let stats = &report.stats;
    println!();
    println!(
        "done: {}/{} answered, {} correct, {} half correct",
        stats.items_answered, stats.items_total, stats.items_correct, stats.items_half_correct
    );
    println!(
        "score: {}/{} ({}%) in {}s",
        stats.total_points,
        stats.max_points,
        stats.percent(),
        stats.elapsed_seconds
    );
    match &report.outcome {
        CompletionOutcome::Synced => println!("saved to {}", report.session_id),
        CompletionOutcome::Retained(RetainReason::LocalOnly) => {
            println!("kept locally ({})", report.session_id);
        }
        CompletionOutcome::Retained(RetainReason::RemoteFailed(e)) => {
            println!("not synced ({e}); will retry next time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_answers() {
        assert_eq!(Command::parse(" casa ").unwrap(), Command::Answer("casa".into()));
    }

    #[test]
    fn commands_take_arguments() {
        assert_eq!(Command::parse(":jump 3").unwrap(), Command::Jump(2));
        assert_eq!(
            Command::parse(":note  rolled r ").unwrap(),
            Command::Note(Some("rolled r".into()))
        );
        assert_eq!(Command::parse(":note").unwrap(), Command::Note(None));
        assert_eq!(Command::parse(":q").unwrap(), Command::Exit);
    }

    #[test]
    fn bad_commands_are_reported() {
        assert!(Command::parse(":jump 0").is_err());
        assert!(Command::parse(":jump x").is_err());
        assert!(Command::parse(":dance").is_err());
    }
}
