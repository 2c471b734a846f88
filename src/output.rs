//! Terminal output for search results

use crate::query::{LineMatch, SearchMode, SearchResults};
use std::io;
use std::path::Path;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// How results are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputOptions {
    pub color: bool,
    /// Group line matches under a path header instead of prefixing each line
    pub heading: bool,
    /// Print the `found: N files` status line after the results
    pub status: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            color: true,
            heading: false,
            status: true,
        }
    }
}

/// Print results to stdout
pub fn print_results(results: &SearchResults, options: OutputOptions) -> io::Result<()> {
    let choice = if options.color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);
    write_results(&mut stdout, results, options)
}

pub fn write_results<W: WriteColor>(out: &mut W, results: &SearchResults, options: OutputOptions) -> io::Result<()> {
    match results.mode {
        SearchMode::Files => {
            for hit in &results.hits {
                write_path(out, &hit.path)?;
                writeln!(out)?;
            }
        }
        SearchMode::Lines => {
            for (i, hit) in results.hits.iter().enumerate() {
                if options.heading {
                    if i > 0 {
                        writeln!(out)?;
                    }
                    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
                    writeln!(out, "{}", hit.path.display())?;
                    out.reset()?;
                }
                for m in &hit.lines {
                    write_match_line(out, &hit.path, m, options.heading)?;
                }
            }
        }
    }

    if options.status {
        if results.truncated {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
            writeln!(out, "(results truncated)")?;
            out.reset()?;
        }
        writeln!(out, "{}", results.status_line())?;
    }

    Ok(())
}

fn write_path<W: WriteColor>(out: &mut W, path: &Path) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
    write!(out, "{}", path.display())?;
    out.reset()
}

/// Print a match line with the occurrence highlighted
fn write_match_line<W: WriteColor>(out: &mut W, path: &Path, m: &LineMatch, heading: bool) -> io::Result<()> {
    if !heading {
        write_path(out, path)?;
        write!(out, ":")?;
    }

    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(out, "{}", m.line_number)?;
    out.reset()?;
    write!(out, ":")?;

    let content = m.snippet.as_str();
    let start = m.match_range.start.min(content.len());
    let end = m.match_range.end.clamp(start, content.len());
    let (Some(before), Some(matched), Some(after)) =
        (content.get(..start), content.get(start..end), content.get(end..))
    else {
        return writeln!(out, "{}", content);
    };

    write!(out, "{}", before)?;
    if !matched.is_empty() {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        write!(out, "{}", matched)?;
        out.reset()?;
    }
    writeln!(out, "{}", after)
}
