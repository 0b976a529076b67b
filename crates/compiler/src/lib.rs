//! pcc compiler library.
//!
//! Compiles a restricted C dialect to the textual assembly language of the
//! GPIO script VM. The pipeline: bundle the source files (prepending the
//! embedded `vm_api.h` unless one is listed), parse the concatenated text
//! with the `cfront` frontend, compile the AST to symbolic assembly, link
//! (dead-function removal, peephole reduction, tag and variable binding),
//! and render the assembly text.

pub mod asm;
pub mod codegen;
pub mod config;
pub mod emit;
pub mod emulated;
pub mod error;
pub mod functions;
pub mod link;
pub mod sources;
pub mod symbols;
pub mod vm_api;

use std::path::PathBuf;

pub use codegen::Pcc;
pub use config::CompilerConfig;
pub use error::PccError;
pub use sources::SourceBundle;

/// Compile a list of source files. `vm_api.h` is prepended from the embedded
/// copy unless one of the inputs already carries that name.
///
/// On failure the error string holds every diagnostic plus the abort banner,
/// ready for stderr.
pub fn compile_files(paths: &[PathBuf], config: &CompilerConfig) -> Result<Pcc, String> {
    let mut bundle = SourceBundle::new();
    let has_header = paths.iter().any(|p| {
        p.file_name()
            .map(|name| name == vm_api::VM_API_FILENAME)
            .unwrap_or(false)
    });
    if !has_header {
        bundle.add_source(vm_api::VM_API_FILENAME, vm_api::VM_API_HEADER);
    }
    for path in paths {
        bundle.add_file(path)?;
    }
    compile_bundle(bundle, config)
}

/// Compile a single in-memory source unit (the embedded `vm_api.h` is still
/// prepended). Used by tests and embedders.
pub fn compile_source(name: &str, source: &str, config: &CompilerConfig) -> Result<Pcc, String> {
    let mut bundle = SourceBundle::new();
    if name != vm_api::VM_API_FILENAME {
        bundle.add_source(vm_api::VM_API_FILENAME, vm_api::VM_API_HEADER);
    }
    bundle.add_source(name, source);
    compile_bundle(bundle, config)
}

fn compile_bundle(mut bundle: SourceBundle, config: &CompilerConfig) -> Result<Pcc, String> {
    let text = bundle.combined();
    let unit = match cfront::parse(&text) {
        Ok(unit) => unit,
        Err(e) => {
            let message = bundle.format_message(e.line, e.column, &e.message, None);
            return Err(format!("{}\n*** aborted with parser error", message));
        }
    };
    if config.debug {
        eprintln!("{:#?}", unit);
    }
    let mut cc = Pcc::new(bundle);
    if cc.compile(&unit, config.reduce) != 0 {
        let mut out = cc.take_diagnostics().join("\n");
        out.push_str("\n*** aborted with compiler error(s)");
        return Err(out);
    }
    Ok(cc)
}
