//! Topology script rendering.
//!
//! Reads the placeholder-bearing template, substitutes every occurrence of
//! the token with the discovered controller address, and writes the result
//! to the share directory the emulator container has bind-mounted. The
//! replacement is inserted verbatim — no escaping — so the template format
//! must tolerate raw address strings.

use std::path::Path;

use crate::error::ProvisionError;

/// Render `template` into `output`, replacing every occurrence of `token`
/// with `replacement`. Any existing output file is overwritten.
pub fn render(
    template: &Path,
    output: &Path,
    token: &str,
    replacement: &str,
) -> Result<(), ProvisionError> {
    let input =
        std::fs::read_to_string(template).map_err(|source| ProvisionError::TemplateReadFailed {
            path: template.to_path_buf(),
            source,
        })?;

    let rendered = input.replace(token, replacement);

    std::fs::write(output, rendered).map_err(|source| ProvisionError::TemplateWriteFailed {
        path: output.to_path_buf(),
        source,
    })?;

    tracing::info!(
        template = %template.display(),
        output = %output.display(),
        "topology script rendered"
    );
    Ok(())
}
