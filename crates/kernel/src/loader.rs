//! Resolution of file-backed programs.

use crate::abi::Word;

/// Maps program file names to entry addresses.
///
/// Used by `add_thread` with the file flag; the caller must hold
/// [`crate::Permissions::RUN_PROGRAMS`].
pub trait ProgramLoader {
    /// Entry address of the program called `name`, if it exists.
    fn load(&self, name: &str) -> Option<Word>;
}

impl<F> ProgramLoader for F
where
    F: Fn(&str) -> Option<Word>,
{
    fn load(&self, name: &str) -> Option<Word> {
        self(name)
    }
}
