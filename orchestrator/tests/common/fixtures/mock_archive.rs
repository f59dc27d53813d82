//! Snapshot archives served over HTTP
//!
//! Archives are plain tarballs built in memory, so extraction runs the real
//! `tar` pipeline without needing a decompressor on the test host.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STORY_ARCHIVE: &str = "/aeneid/story_pruned.tar";
pub const GETH_ARCHIVE: &str = "/aeneid/geth_pruned.tar";

pub fn tar_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (entry_path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, entry_path, *contents).unwrap();
    }
    builder.into_inner().unwrap()
}

pub struct MockArchiveServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockArchiveServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    pub fn url(&self, archive: &str) -> String {
        format!("{}{}", self.base_url, archive)
    }

    pub async fn serve(&self, archive: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(archive))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&self.server)
            .await;
    }

    pub async fn fail(&self, archive: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(archive))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// A consensus archive carrying its own signing state plus block data
    pub async fn serve_story(&self, with_signing_state: bool) {
        let mut entries: Vec<(&str, &[u8])> = vec![
            ("data/blockstore.db/000001.log", &b"snapshot-blocks"[..]),
            ("data/application.db/000001.log", &b"snapshot-app"[..]),
        ];
        if with_signing_state {
            entries.push((
                "data/priv_validator_state.json",
                super::ARCHIVE_SIGNING_STATE.as_bytes(),
            ));
        }
        self.serve(STORY_ARCHIVE, tar_archive(&entries)).await;
    }

    pub async fn serve_geth(&self) {
        self.serve(
            GETH_ARCHIVE,
            tar_archive(&[("geth/chaindata/000001.ldb", &b"snapshot-chain"[..])]),
        )
        .await;
    }

    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}
