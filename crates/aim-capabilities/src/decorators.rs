//! Capability detection from `track_action`/`require_approval` call sites.
//!
//! Grounded on `capability_detection.py::_scan_file_for_decorators`, which
//! walks the AST of the calling module looking for
//! `@agent.perform_action(...)` decorators and extracts the literal
//! `action_type` argument. Rust has no decorators; the nearest analogue is
//! a direct call to one of this SDK's wrapper functions
//! (`track_action`/`require_approval`, spec §4.5) with a string-literal
//! action name as the first argument. This module parses a caller-supplied
//! source file with `syn` and extracts those literals the same way the
//! Python source extracts decorator arguments.

use std::collections::BTreeSet;
use std::path::Path;

use aim_core::Capability;
use syn::visit::{self, Visit};
use syn::{Expr, ExprCall, ExprLit, ExprPath, Lit};

use crate::error::{CapabilityError, CapabilityResult};

/// Action name → capability, translated directly from the Python source's
/// `action_to_capability` dict.
const ACTION_CAPABILITIES: &[(&str, &str)] = &[
    ("read_database", "access_database"),
    ("write_database", "access_database"),
    ("query_database", "access_database"),
    ("send_email", "send_email"),
    ("read_email", "read_email"),
    ("read_file", "read_files"),
    ("write_file", "write_files"),
    ("delete_file", "write_files"),
    ("execute_command", "execute_code"),
    ("run_code", "execute_code"),
    ("make_request", "make_api_calls"),
    ("call_api", "make_api_calls"),
    ("web_search", "web_scraping"),
    ("browse_web", "web_automation"),
];

/// Parse `source_path` and extract capabilities implied by
/// `track_action("...")`/`require_approval("...")` call sites.
///
/// An action name with no table entry is used verbatim as the capability
/// name, matching the Python source's fallback (`action_type` itself).
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse as Rust.
pub fn detect_from_source(source_path: &Path) -> CapabilityResult<Vec<Capability>> {
    let contents = std::fs::read_to_string(source_path).map_err(|source| {
        CapabilityError::SourceRead {
            path: source_path.display().to_string(),
            source,
        }
    })?;
    Ok(detect_from_source_str(&contents)?)
}

/// Same as [`detect_from_source`] but operating on in-memory source text.
///
/// # Errors
///
/// Returns an error if `contents` does not parse as a Rust source file.
pub fn detect_from_source_str(contents: &str) -> Result<Vec<Capability>, syn::Error> {
    let file = syn::parse_file(contents)?;
    let mut visitor = ActionCallVisitor::default();
    visitor.visit_file(&file);

    let mut caps = BTreeSet::new();
    for action in visitor.action_names {
        let capability = ACTION_CAPABILITIES
            .iter()
            .find(|(name, _)| *name == action)
            .map_or(action.clone(), |(_, cap)| (*cap).to_string());
        caps.insert(capability);
    }
    Ok(caps.into_iter().collect())
}

#[derive(Default)]
struct ActionCallVisitor {
    action_names: Vec<String>,
}

impl Visit<'_> for ActionCallVisitor {
    fn visit_expr_call(&mut self, call: &ExprCall) {
        if is_tracked_call(&call.func) {
            if let Some(first) = call.args.first() {
                if let Some(literal) = string_literal(first) {
                    self.action_names.push(literal);
                }
            }
        }
        visit::visit_expr_call(self, call);
    }
}

/// `true` if `func` refers to `track_action`/`require_approval`, whether
/// called bare (`track_action(...)`) or through a path
/// (`client.track_action(...)`, `aim_client::require_approval(...)`).
fn is_tracked_call(func: &Expr) -> bool {
    let name = match func {
        Expr::Path(ExprPath { path, .. }) => path.segments.last().map(|s| s.ident.to_string()),
        Expr::Field(field) => match &field.member {
            syn::Member::Named(ident) => Some(ident.to_string()),
            syn::Member::Unnamed(_) => None,
        },
        _ => None,
    };
    matches!(name.as_deref(), Some("track_action") | Some("require_approval"))
}

fn string_literal(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Some(s.value()),
        _ => None,
    }
}
