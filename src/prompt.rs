//! Prompts displayed to the user to gather input.

use crate::scheduler::Rating;
use anyhow::bail;
use anyhow::Result;
use std::io::{stdin, stdout, Stdout, Write};
use termion::clear;
use termion::event::Key;
use termion::input::TermRead;
use termion::raw::{IntoRawMode, RawTerminal};

const QUIT: &[Key] = &[Key::Char('q'), Key::Ctrl('c')];

/// Displays the given prompt and waits for a yes / no answer. Yes maps to true, and no maps to
/// false.
pub fn binary(prompt: impl AsRef<str>) -> Result<bool> {
    let (mut stdout, yes) = read_key(&format!("{} [y/n] ", prompt.as_ref()), QUIT, yes_no)?;

    write!(stdout, "{}\r\n", if yes { "yes" } else { "no" })?;
    stdout.flush()?;

    Ok(yes)
}

/// Displays the given prompt and waits until a key is pressed.
pub fn any(prompt: impl AsRef<str>) -> Result<()> {
    let (mut stdout, ()) = read_key(prompt.as_ref(), &[Key::Ctrl('c')], |_| Some(()))?;

    write!(stdout, "\r{}", clear::AfterCursor)?;
    stdout.flush()?;

    Ok(())
}

/// Asks how well a card was recalled, answered with the keys 1 to 4.
pub fn rating() -> Result<Rating> {
    let (mut stdout, rating) = read_key(
        "1) Again  2) Hard  3) Good  4) Easy\r\nHow well did you know this? ",
        QUIT,
        rating_key,
    )?;

    write!(stdout, "{rating}\r\n")?;
    stdout.flush()?;

    Ok(rating)
}

fn yes_no(key: Key) -> Option<bool> {
    match key {
        Key::Char('y') => Some(true),
        Key::Char('n') => Some(false),
        _ => None,
    }
}

fn rating_key(key: Key) -> Option<Rating> {
    match key {
        Key::Char(c @ '1'..='4') => Rating::try_from(c as u8 - b'0').ok(),
        _ => None,
    }
}

/// Shows `prompt` with the terminal in raw mode and hands each key press to `select` until it
/// picks a value. Any key in `quit` aborts instead. The terminal stays in raw mode until the
/// returned handle is dropped.
fn read_key<T>(
    prompt: &str,
    quit: &[Key],
    mut select: impl FnMut(Key) -> Option<T>,
) -> Result<(RawTerminal<Stdout>, T)> {
    let mut stdout = stdout().into_raw_mode()?;
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    for key in stdin().keys() {
        let key = key?;

        if quit.contains(&key) {
            write!(stdout, "\r\n")?;
            stdout.flush()?;

            bail!("Exiting instead of answering...")
        }

        if let Some(selection) = select(key) {
            return Ok((stdout, selection));
        }
    }

    write!(stdout, "\r\n")?;
    stdout.flush()?;

    bail!("Input closed before an answer was given")
}

/// Displays the given prompt and reads a line of text. Surrounding whitespace is trimmed.
pub fn line(prompt: impl AsRef<str>) -> Result<String> {
    let mut stdout = stdout();
    write!(stdout, "{} ", prompt.as_ref())?;
    stdout.flush()?;

    let mut stdin = stdin();

    match TermRead::read_line(&mut stdin)? {
        Some(line) => Ok(line.trim().to_string()),
        None => bail!("Input closed before an answer was given"),
    }
}

/// Like [`line`], but asks again until something other than whitespace is entered.
pub fn required_line(prompt: impl AsRef<str>) -> Result<String> {
    loop {
        let line = line(prompt.as_ref())?;
        if !line.is_empty() {
            return Ok(line);
        }

        println!("This can't be empty.");
    }
}
