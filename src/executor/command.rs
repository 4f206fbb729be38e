//! Argv construction for each tool kind.
//!
//! Definition values expand to whitespace-split token lists; a missing
//! definition expands to nothing. Compiler steps are instructed to emit a
//! `<output>.d` depfile so the next graph construction sees header
//! dependencies. Link steps with very large input lists go through a
//! response file to stay under OS argv length limits.

use crate::error::BuildError;
use crate::graph::{BuildStep, Definitions, Tool};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::Write;
use tracing::debug;

/// Input count above which an `ld` step switches to a response file.
const RESPONSE_FILE_THRESHOLD: usize = 50;

/// Build the argv for `step`.
///
/// In dry-run mode no response file is written; the `@file` reference still
/// appears in the argv so the printed command matches what a real run would
/// execute.
///
/// # Errors
///
/// Returns [`BuildError::Io`] when a needed response file cannot be
/// written.
pub fn build_argv(
    step: &BuildStep,
    definitions: &Definitions,
    manifest: &Utf8Path,
    dry_run: bool,
) -> Result<Vec<String>, BuildError> {
    let mut argv = Vec::new();
    let output = step.output.as_str();

    match step.tool {
        Tool::Cc | Tool::Cxx => {
            let (driver, flags) = match step.tool {
                Tool::Cc => ("cc", "cflags"),
                _ => ("cxx", "cxxflags"),
            };
            expand(definitions, driver, &mut argv);
            expand(definitions, flags, &mut argv);
            argv.push("-MMD".to_owned());
            argv.push("-MF".to_owned());
            argv.push(format!("{output}.d"));
            argv.push("-c".to_owned());
            push_inputs(step, &mut argv);
            argv.push("-o".to_owned());
            argv.push(output.to_owned());
        }
        Tool::Ld => {
            expand(definitions, "cxx", &mut argv);
            if step.parsed_inputs.len() > RESPONSE_FILE_THRESHOLD {
                argv.push(response_file_arg(step, manifest, dry_run)?);
            } else {
                push_inputs(step, &mut argv);
            }
            argv.push("-o".to_owned());
            argv.push(output.to_owned());
            expand(definitions, "ldflags", &mut argv);
            expand(definitions, "ldlibs", &mut argv);
        }
        Tool::Sld => {
            expand(definitions, "cxx", &mut argv);
            argv.push("-shared".to_owned());
            push_inputs(step, &mut argv);
            argv.push("-o".to_owned());
            argv.push(output.to_owned());
        }
        Tool::Ar => {
            argv.push("ar".to_owned());
            argv.push("rcs".to_owned());
            argv.push(output.to_owned());
            push_inputs(step, &mut argv);
        }
    }

    Ok(argv)
}

/// Append a definition's value, split on ASCII space with empty tokens
/// dropped.
fn expand(definitions: &Definitions, key: &str, argv: &mut Vec<String>) {
    if let Some(value) = definitions.get(key) {
        argv.extend(
            value
                .split(' ')
                .filter(|token| !token.is_empty())
                .map(str::to_owned),
        );
    }
}

fn push_inputs(step: &BuildStep, argv: &mut Vec<String>) {
    argv.extend(step.parsed_inputs.iter().map(|input| input.as_str().to_owned()));
}

/// Ensure `<output>.rsp` holds one input path per line and return the
/// `@file` argument. An existing response file newer than the manifest is
/// reused as is.
fn response_file_arg(
    step: &BuildStep,
    manifest: &Utf8Path,
    dry_run: bool,
) -> Result<String, BuildError> {
    let rsp = Utf8PathBuf::from(format!("{}.rsp", step.output));
    if !response_file_reusable(&rsp, manifest) && !dry_run {
        let mut contents = Vec::new();
        for input in &step.parsed_inputs {
            writeln!(contents, "{input}").expect("write to memory buffer");
        }
        fs::write(&rsp, contents).map_err(|err| BuildError::io(format!("writing {rsp}"), err))?;
        debug!(path = %rsp, inputs = step.parsed_inputs.len(), "wrote response file");
    }
    Ok(format!("@{rsp}"))
}

fn response_file_reusable(rsp: &Utf8Path, manifest: &Utf8Path) -> bool {
    let mtime = |path: &Utf8Path| fs::metadata(path.as_std_path()).and_then(|m| m.modified()).ok();
    match (mtime(rsp), mtime(manifest)) {
        (Some(rsp_time), Some(manifest_time)) => rsp_time > manifest_time,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn defs(pairs: &[(&str, &str)]) -> Definitions {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn step(tool: Tool, inputs_raw: &str, output: &str) -> BuildStep {
        BuildStep {
            tool,
            inputs_raw: inputs_raw.to_owned(),
            parsed_inputs: inputs_raw
                .split(',')
                .filter(|s| !s.is_empty())
                .map(Utf8PathBuf::from)
                .collect(),
            output: Utf8PathBuf::from(output),
            depfile_inputs: None,
        }
    }

    fn argv_for(tool: Tool, inputs: &str, output: &str, definitions: &Definitions) -> Vec<String> {
        build_argv(
            &step(tool, inputs, output),
            definitions,
            Utf8Path::new("catalyst.build"),
            true,
        )
        .expect("argv")
    }

    #[test]
    fn cc_invocation_shape() {
        let definitions = defs(&[("cc", "gcc"), ("cflags", "-O2 -Wall")]);
        let argv = argv_for(Tool::Cc, "a.c", "a.o", &definitions);
        assert_eq!(
            argv,
            ["gcc", "-O2", "-Wall", "-MMD", "-MF", "a.o.d", "-c", "a.c", "-o", "a.o"]
        );
    }

    #[test]
    fn cxx_invocation_uses_cxxflags() {
        let definitions = defs(&[("cxx", "g++"), ("cxxflags", "-std=c++20")]);
        let argv = argv_for(Tool::Cxx, "a.cpp", "a.o", &definitions);
        assert_eq!(
            argv,
            ["g++", "-std=c++20", "-MMD", "-MF", "a.o.d", "-c", "a.cpp", "-o", "a.o"]
        );
    }

    #[test]
    fn ld_invocation_appends_ldflags_and_ldlibs() {
        let definitions = defs(&[("cxx", "g++"), ("ldflags", "-L/opt/lib"), ("ldlibs", "-lm")]);
        let argv = argv_for(Tool::Ld, "a.o,b.o", "app", &definitions);
        assert_eq!(argv, ["g++", "a.o", "b.o", "-o", "app", "-L/opt/lib", "-lm"]);
    }

    #[test]
    fn sld_invocation_shape() {
        let definitions = defs(&[("cxx", "g++")]);
        let argv = argv_for(Tool::Sld, "a.o", "libx.so", &definitions);
        assert_eq!(argv, ["g++", "-shared", "a.o", "-o", "libx.so"]);
    }

    #[test]
    fn ar_invocation_ignores_definitions() {
        let definitions = defs(&[("cc", "gcc")]);
        let argv = argv_for(Tool::Ar, "a.o,b.o", "lib.a", &definitions);
        assert_eq!(argv, ["ar", "rcs", "lib.a", "a.o", "b.o"]);
    }

    #[rstest]
    #[case("gcc  -pipe", &["gcc", "-pipe"])]
    #[case("  gcc ", &["gcc"])]
    #[case("", &[])]
    fn definition_tokens_split_on_single_spaces(#[case] value: &str, #[case] expected: &[&str]) {
        let definitions = defs(&[("cc", value)]);
        let mut argv = Vec::new();
        expand(&definitions, "cc", &mut argv);
        assert_eq!(argv, expected);
    }

    #[test]
    fn missing_definition_expands_to_nothing() {
        let argv = argv_for(Tool::Cc, "a.c", "a.o", &Definitions::new());
        assert_eq!(argv, ["-MMD", "-MF", "a.o.d", "-c", "a.c", "-o", "a.o"]);
    }

    #[test]
    fn large_ld_step_uses_a_response_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let out_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8");
        let manifest = out_dir.join("catalyst.build");
        std::fs::write(&manifest, "").expect("manifest");

        let inputs: Vec<String> = (0..60).map(|i| format!("obj{i}.o")).collect();
        let output = out_dir.join("app");
        let link = step(Tool::Ld, &inputs.join(","), output.as_str());
        let definitions = defs(&[("cxx", "g++")]);

        let argv = build_argv(&link, &definitions, &manifest, false).expect("argv");
        let rsp = format!("{output}.rsp");
        assert_eq!(argv, ["g++", &format!("@{rsp}"), "-o", output.as_str()]);

        let contents = std::fs::read_to_string(&rsp).expect("response file");
        assert_eq!(contents.lines().count(), 60);
        assert_eq!(contents.lines().next(), Some("obj0.o"));
    }

    #[test]
    fn dry_run_does_not_write_the_response_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let out_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8");
        let manifest = out_dir.join("catalyst.build");
        std::fs::write(&manifest, "").expect("manifest");

        let inputs: Vec<String> = (0..60).map(|i| format!("obj{i}.o")).collect();
        let output = out_dir.join("app");
        let link = step(Tool::Ld, &inputs.join(","), output.as_str());

        let argv = build_argv(&link, &Definitions::new(), &manifest, true).expect("argv");
        assert_eq!(argv[0], format!("@{output}.rsp"));
        assert!(!std::path::Path::new(&format!("{output}.rsp")).exists());
    }

    #[test]
    fn small_ld_step_keeps_inputs_inline() {
        let inputs: Vec<String> = (0..50).map(|i| format!("obj{i}.o")).collect();
        let definitions = defs(&[("cxx", "g++")]);
        let argv = argv_for(Tool::Ld, &inputs.join(","), "app", &definitions);
        assert_eq!(argv.len(), 1 + 50 + 2);
        assert!(!argv.iter().any(|arg| arg.starts_with('@')));
    }
}
