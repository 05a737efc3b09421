//! Implements the command line behavior.

use codespan_reporting::{
    diagnostic::{Diagnostic, Label, LabelStyle, Severity},
    files::SimpleFiles,
    term::{
        self,
        termcolor::{ColorChoice, StandardStream},
    },
};
use oberon0_codegen::listing;
use oberon0_dsl::core::FileId;
use oberon0_dsl::problems::ProblemKind;
use std::{
    fs::File,
    io::{Read, Write},
    path::PathBuf,
};

/// Checks the specified files, reporting every problem found without
/// emitting code.
pub fn check(paths: Vec<PathBuf>, suppress_output: bool) -> Result<(), String> {
    let mut problems = 0usize;
    for path in paths {
        let contents = read_file(&path)?;
        let file_id = FileId::from_path(&path);
        if let Err(diagnostics) = oberon0_parser::compile(&contents, &file_id) {
            problems += diagnostics.len();
            handle_diagnostics(diagnostics, &file_id, &contents, suppress_output);
        }
    }
    if problems != 0 {
        return Err(format!("Number of problems: {}", problems));
    }
    Ok(())
}

/// Compiles one module and writes the instruction listing to the output
/// file, or to stdout when no output was given.
pub fn compile(
    path: PathBuf,
    output: Option<PathBuf>,
    suppress_output: bool,
) -> Result<(), String> {
    let contents = read_file(&path)?;
    let file_id = FileId::from_path(&path);
    match oberon0_parser::compile(&contents, &file_id) {
        Ok(instructions) => {
            let text = listing(&instructions);
            match output {
                Some(target) => {
                    let mut file = File::create(&target)
                        .map_err(|e| format!("Failed creating {}. {}", target.display(), e))?;
                    file.write_all(text.as_bytes())
                        .map_err(|e| format!("Failed writing {}. {}", target.display(), e))?;
                }
                None => print!("{}", text),
            }
            Ok(())
        }
        Err(diagnostics) => {
            let count = diagnostics.len();
            handle_diagnostics(diagnostics, &file_id, &contents, suppress_output);
            Err(format!("Number of problems: {}", count))
        }
    }
}

fn read_file(path: &PathBuf) -> Result<String, String> {
    let mut file = File::open(path)
        .map_err(|e| format!("Failed opening file {}. {}", path.display(), e))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| format!("Failed to read file {}. {}", path.display(), e))?;
    Ok(contents)
}

fn handle_diagnostics(
    diagnostics: Vec<oberon0_dsl::diagnostic::Diagnostic>,
    file_id: &FileId,
    content: &String,
    suppress_output: bool,
) {
    if suppress_output {
        return;
    }
    let writer = StandardStream::stderr(ColorChoice::Always);
    let config = codespan_reporting::term::Config::default();

    let mut files: SimpleFiles<String, &String> = SimpleFiles::new();
    let handle = files.add(file_id.to_string(), content);

    for diagnostic in diagnostics {
        let diagnostic = map_diagnostic(diagnostic, handle);
        let _ = term::emit(&mut writer.lock(), &config, &files, &diagnostic).map_err(|err| {
            println!("Failed writing to terminal: {}", err);
            1usize
        });
    }
}

fn map_label(
    label: oberon0_dsl::diagnostic::Label,
    style: LabelStyle,
    file: usize,
) -> Label<usize> {
    Label::new(style, file, label.span.start..label.span.end).with_message(label.message)
}

fn map_diagnostic(
    diagnostic: oberon0_dsl::diagnostic::Diagnostic,
    file: usize,
) -> Diagnostic<usize> {
    let description = diagnostic.description();
    let code = diagnostic.code();
    let severity = match diagnostic.kind() {
        ProblemKind::Internal => Severity::Bug,
        _ => Severity::Error,
    };

    // Set the primary label
    let mut labels = vec![map_label(diagnostic.primary, LabelStyle::Primary, file)];

    // Add any secondary labels
    labels.extend(
        diagnostic
            .secondary
            .into_iter()
            .map(|lbl| map_label(lbl, LabelStyle::Secondary, file)),
    );

    Diagnostic::new(severity)
        .with_code(code)
        .with_message(description)
        .with_labels(labels)
}
