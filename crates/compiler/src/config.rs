//! Compiler configuration.

/// Options controlling one compilation.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Run the peephole reducer over every buffer (`-n` disables it)
    pub reduce: bool,
    /// Interleave comments and the variable block in the output (`-c`)
    pub comments: bool,
    /// Dump the parsed translation unit to stderr (`-d`)
    pub debug: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_reduce(mut self, reduce: bool) -> Self {
        self.reduce = reduce;
        self
    }

    pub fn with_comments(mut self, comments: bool) -> Self {
        self.comments = comments;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            reduce: true,
            comments: false,
            debug: false,
        }
    }
}
