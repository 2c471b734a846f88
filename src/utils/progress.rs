//! Progress bar for indexing passes; a no-op without the `progress` feature

#[cfg(feature = "progress")]
pub use indicatif::{ProgressBar, ProgressStyle};

#[cfg(not(feature = "progress"))]
pub use self::noop::*;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Bar for a full pass. Its length is set once the walk knows the file count.
pub fn indexing_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    match ProgressStyle::default_bar().template(BAR_TEMPLATE) {
        Ok(style) => bar.set_style(style.progress_chars("█▓▒░  ")),
        Err(e) => log::debug!("invalid progress template: {}", e),
    }
    bar
}

#[cfg(not(feature = "progress"))]
mod noop {
    use std::borrow::Cow;

    /// Stand-in that ignores every update
    #[derive(Clone)]
    pub struct ProgressBar;

    impl ProgressBar {
        pub fn new(_len: u64) -> Self {
            ProgressBar
        }

        pub fn set_style(&self, _style: ProgressStyle) {}
        pub fn set_message(&self, _msg: impl Into<Cow<'static, str>>) {}
        pub fn set_length(&self, _len: u64) {}
        pub fn set_position(&self, _pos: u64) {}
        pub fn finish_and_clear(&self) {}
    }

    pub struct ProgressStyle;

    impl ProgressStyle {
        pub fn default_bar() -> Self {
            ProgressStyle
        }

        pub fn template(self, _template: &str) -> Result<Self, std::convert::Infallible> {
            Ok(self)
        }

        pub fn progress_chars(self, _chars: &str) -> Self {
            self
        }
    }
}
