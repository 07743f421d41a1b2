//! Result download from the final wizard page.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::dom::Snapshot;
use crate::error::GeoconvertResult;
use crate::session::Session;

/// A result file advertised by the results page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultLink {
    /// Server-side path, with the page's backslashes turned into `/`.
    pub remote_path: String,
    /// Last path segment without the download-counter prefix.
    pub file_name: String,
}

/// A result file written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadedFile {
    pub url: String,
    pub path: PathBuf,
    pub bytes: usize,
}

fn counter_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+_").expect("counter prefix regex is valid"))
}

/// Strip the numeric download counter (`123_`) from a served file name.
pub fn clean_remote_name(name: &str) -> String {
    counter_prefix().replace(name, "").into_owned()
}

/// Local name for a result: `<upload stem>-<clean remote name>`.
pub fn local_file_name(uploaded: &str, remote: &str) -> String {
    let stem = Path::new(uploaded)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(uploaded);
    format!("{stem}-{}", clean_remote_name(remote))
}

/// Every `<a class="...">` result link on the page.
pub fn find_result_links(
    snapshot: &Snapshot,
    link_class: &str,
) -> GeoconvertResult<Vec<ResultLink>> {
    snapshot
        .root()
        .children("a", |a| a.has_class(link_class))
        .into_iter()
        .map(|a| -> GeoconvertResult<ResultLink> {
            let href = a.require("a", "href")?;
            let remote_path = href.split('\\').collect::<Vec<_>>().join("/");
            let last = remote_path.rsplit('/').next().unwrap_or_default();
            let file_name = clean_remote_name(last);
            Ok(ResultLink {
                remote_path,
                file_name,
            })
        })
        .collect()
}

/// Downloads every result link into `output_dir`.
pub struct ResultCollector<'a> {
    session: &'a Session,
    output_dir: &'a Path,
    link_class: &'a str,
}

impl<'a> ResultCollector<'a> {
    pub fn new(session: &'a Session, output_dir: &'a Path, link_class: &'a str) -> Self {
        Self {
            session,
            output_dir,
            link_class,
        }
    }

    /// Fetch each link on `snapshot`, one local file per link. Content is
    /// written as received; there is no checksum or size verification.
    pub async fn collect(
        &self,
        snapshot: &Snapshot,
        uploaded_name: &str,
    ) -> GeoconvertResult<Vec<DownloadedFile>> {
        let links = find_result_links(snapshot, self.link_class)?;
        if links.is_empty() {
            tracing::warn!(page = %snapshot.url(), "results page has no result links");
        }

        tokio::fs::create_dir_all(self.output_dir).await?;

        let mut downloaded = Vec::with_capacity(links.len());
        for link in links {
            let url: Url = self.session.resolve(&link.remote_path)?;
            let name = local_file_name(uploaded_name, &link.file_name);
            let path = self.output_dir.join(&name);

            let bytes = self.session.fetch_bytes(&url).await?;
            tokio::fs::write(&path, &bytes).await?;
            tracing::info!("Downloaded: {name} ({} bytes)", bytes.len());

            downloaded.push(DownloadedFile {
                url: url.to_string(),
                path,
                bytes: bytes.len(),
            });
        }

        Ok(downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeoconvertError;

    #[test]
    fn test_local_file_name() {
        assert_eq!(local_file_name("mydata.csv", "123_result.zip"), "mydata-result.zip");
        assert_eq!(local_file_name("mydata.csv", "result.zip"), "mydata-result.zip");
        assert_eq!(local_file_name("noext", "9_out.csv"), "noext-out.csv");
    }

    #[test]
    fn test_only_leading_counter_is_stripped() {
        assert_eq!(clean_remote_name("123_lsoa_2011_output.csv"), "lsoa_2011_output.csv");
        assert_eq!(clean_remote_name("report_1_2.txt"), "report_1_2.txt");
    }

    #[test]
    fn test_find_result_links_converts_backslashes() {
        let html = r#"
        <html><body>
            <a class="gresults" href="output\jobs\123_converted.csv">CSV</a>
            <a class="gresults extra" href="output/77_log.txt">Log</a>
            <a href="help.cfm">Help</a>
        </body></html>"#;
        let snap = Snapshot::parse("http://x/", html);
        let links = find_result_links(&snap, "gresults").unwrap();
        assert_eq!(
            links,
            vec![
                ResultLink {
                    remote_path: "output/jobs/123_converted.csv".into(),
                    file_name: "converted.csv".into(),
                },
                ResultLink {
                    remote_path: "output/77_log.txt".into(),
                    file_name: "log.txt".into(),
                },
            ]
        );
    }

    #[test]
    fn test_result_link_without_href_is_an_error() {
        let snap = Snapshot::parse("http://x/", r#"<a class="gresults">broken</a>"#);
        assert!(matches!(
            find_result_links(&snap, "gresults"),
            Err(GeoconvertError::MissingAttribute { element: "a", .. })
        ));
    }
}
