//! Turning protection off for a package, here or in another process.

use tracing::info;

use crate::error::Result;
use crate::session::SessionStore;
use crate::templates::TemplateStore;

/// Un-enrols `package`, purges its samples and drops any open session.
///
/// The package is unprotected when this returns, even on `Err`: the error only
/// reports that stale sample data could not be deleted.
pub fn disable_protection(
    templates: &TemplateStore,
    sessions: &SessionStore,
    package: &str,
) -> Result<()> {
    let purge = templates.remove_all_templates(package);
    sessions.clear_session(package);
    info!(package = %package, purged = purge.is_ok(), "Protection disabled");
    purge
}

/// Reloads templates changed by another process and drops the session of
/// every unlocked package that is no longer protected. Returns the packages
/// whose sessions were cleared.
pub fn sync_protection(templates: &TemplateStore, sessions: &SessionStore) -> Result<Vec<String>> {
    if !templates.refresh()? {
        return Ok(Vec::new());
    }
    let released: Vec<String> = sessions
        .unlocked_packages()
        .into_iter()
        .filter(|package| !templates.is_protected(package))
        .collect();
    for package in &released {
        sessions.clear_session(package);
        info!(package = %package, "Protection removed elsewhere; session cleared");
    }
    Ok(released)
}
