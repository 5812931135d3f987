//! Opening the consent page.

// self
use crate::_prelude::*;

/// Opens URLs for the operator; replaced by a recorder in tests.
pub trait BrowserLauncher
where
	Self: Send + Sync,
{
	/// Opens `url`. Failure is reported but never aborts the flow.
	fn open(&self, url: &Url) -> Result<(), BoxError>;
}

/// [`BrowserLauncher`] using the platform's default browser.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemBrowser;
impl BrowserLauncher for SystemBrowser {
	fn open(&self, url: &Url) -> Result<(), BoxError> {
		webbrowser::open(url.as_str()).map_err(Into::into)
	}
}
