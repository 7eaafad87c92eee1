use std::io::{self, Write};

use camino::Utf8Path;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use miette::IntoDiagnostic;

use crate::domain::ResumeChoice;

/// Asks what to do with an output file that already has records.
pub fn ask_resume_choice(output: &Utf8Path) -> miette::Result<ResumeChoice> {
    let mut stderr = io::stderr();
    writeln!(
        stderr,
        "{output} already has content. Remove it and start over (1), keep it and \
         download only the missing sequences (2), or exit (3)? [1/2/3]"
    )
    .into_diagnostic()?;
    stderr.flush().into_diagnostic()?;

    enable_raw_mode().into_diagnostic()?;
    let choice = loop {
        match event::read() {
            Ok(Event::Key(key)) => {
                if let Some(choice) = choice_for_key(key) {
                    break Ok(choice);
                }
            }
            Ok(_) => {}
            Err(err) => break Err(err),
        }
    };
    disable_raw_mode().into_diagnostic()?;

    let choice = choice.into_diagnostic()?;
    writeln!(stderr, "{choice}").into_diagnostic()?;
    Ok(choice)
}

pub fn choice_for_key(key: KeyEvent) -> Option<ResumeChoice> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(ResumeChoice::Abort)
        }
        KeyCode::Char('1') => Some(ResumeChoice::Fresh),
        KeyCode::Char('2') => Some(ResumeChoice::Resume),
        KeyCode::Char('3') | KeyCode::Esc => Some(ResumeChoice::Abort),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_choices() {
        let key = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert_eq!(choice_for_key(key(KeyCode::Char('1'))), Some(ResumeChoice::Fresh));
        assert_eq!(choice_for_key(key(KeyCode::Char('2'))), Some(ResumeChoice::Resume));
        assert_eq!(choice_for_key(key(KeyCode::Esc)), Some(ResumeChoice::Abort));
        assert_eq!(choice_for_key(key(KeyCode::Char('x'))), None);
        assert_eq!(
            choice_for_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(ResumeChoice::Abort)
        );
    }
}
