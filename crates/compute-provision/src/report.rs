//! Plain-text node report.

use std::io::Write;

use crate::providers::{NodeMetadata, ProvisionError};

/// Write the node descriptor, its name and first public address, and the
/// issued login credentials.
///
/// # Errors
/// Returns [`ProvisionError::NotFound`] if the node has no public address,
/// or [`ProvisionError::Io`] if writing fails.
pub fn write_report<W: Write>(out: &mut W, node: &NodeMetadata) -> Result<(), ProvisionError> {
    let public_address = node.first_public_address().ok_or_else(|| {
        ProvisionError::NotFound(format!("public address for node {}", node.name))
    })?;

    writeln!(out, "  {node}")?;
    writeln!(out, "  Instance {} started with IP {public_address}", node.name)?;
    match &node.credentials {
        Some(credentials) => {
            writeln!(out, "  Username {}", credentials.identity)?;
            writeln!(out, "  Key {}", credentials.credential)?;
        }
        None => {
            writeln!(out, "  Username <none>")?;
            writeln!(out, "  Key <none>")?;
        }
    }
    out.flush()?;
    Ok(())
}
