//! Template command - renders and validates the deployment descriptor

pub mod descriptor;
pub mod render;
pub mod validate;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

pub use descriptor::TemplateDescriptor;
pub use render::{render, unresolved_placeholders, Placeholders, TEMPLATE};
pub use validate::{check_rendered, validate, ValidationReport, Violation};

#[derive(Subcommand)]
pub enum TemplateCommand {
    /// Write template.yaml with the release placeholders substituted
    Render(RenderArgs),
    /// Check a template against the deployment contract
    Validate(ValidateArgs),
}

impl TemplateCommand {
    pub fn run(self) -> Result<()> {
        match self {
            TemplateCommand::Render(args) => execute_render(args),
            TemplateCommand::Validate(args) => execute_validate(args),
        }
    }
}

#[derive(Args)]
pub struct RenderArgs {
    /// Bucket holding the packaged function code
    #[arg(long)]
    pub code_uri_bucket: String,

    /// Serverless Application Repository application name
    #[arg(long, default_value = "elastic-serverless-forwarder")]
    pub sar_app_name: String,

    /// Application version (MAJOR.MINOR.PATCH)
    #[arg(long)]
    pub semantic_version: String,

    /// Output file
    #[arg(short, long, default_value = "template.yaml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Template to check
    pub file: PathBuf,

    /// The template is about to be deployed: placeholders must be resolved
    #[arg(long)]
    pub rendered: bool,
}

fn execute_render(args: RenderArgs) -> Result<()> {
    let placeholders = Placeholders {
        code_uri_bucket: args.code_uri_bucket,
        sar_app_name: args.sar_app_name,
        semantic_version: args.semantic_version,
    };
    render_to_file(&placeholders, &args.output, args.force)?;

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  sam package --template-file {} \\", args.output.display());
    println!("    --s3-bucket {} \\", placeholders.code_uri_bucket);
    println!("    --output-template-file packaged.yaml");
    println!("  sam publish --template packaged.yaml");
    Ok(())
}

/// Render the shipped descriptor and validate the result before writing it
pub fn render_to_file(placeholders: &Placeholders, output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists, pass --force to overwrite",
            output.display()
        );
    }

    let content = render(TEMPLATE, placeholders)?;
    let report = check_rendered(&content);
    if !report.is_ok() {
        bail!("Rendered template is invalid: {report}");
    }

    fs::write(output, &content)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    tracing::info!(
        output = %output.display(),
        version = %placeholders.semantic_version,
        "template rendered"
    );
    Ok(())
}

fn execute_validate(args: ValidateArgs) -> Result<()> {
    let report = validate_file(&args.file, args.rendered)?;
    println!("{}: {report}", args.file.display());
    if !report.is_ok() {
        bail!("{} is not deployable", args.file.display());
    }
    Ok(())
}

pub fn validate_file(path: &Path, rendered: bool) -> Result<ValidationReport> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let report = if rendered {
        check_rendered(&text)
    } else {
        validate(&text)
    };
    tracing::debug!(
        path = %path.display(),
        rendered,
        violations = report.violations.len(),
        "template validated"
    );
    Ok(report)
}
