//! Test environment: mock recording host, stand-in encoder and scratch directories

use super::fixtures::{FfmpegBehavior, LOGIN_PAGE, fake_ffmpeg, fake_ffprobe};
use connect_dl::config::{Config, FileCollisionAction};
use connect_dl::{EncodingStrategy, Pipeline};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Everything one integration test needs
pub struct TestEnv {
    /// Scratch root holding binaries, workspaces and outputs
    pub dir: TempDir,
    /// Mock recording host
    pub server: MockServer,
    /// Stand-in ffmpeg
    pub ffmpeg: PathBuf,
    /// Argument log written by the stand-in ffmpeg
    pub ffmpeg_log: PathBuf,
}

impl TestEnv {
    /// Start a mock host and install a stand-in ffmpeg behaving as `behavior`
    pub async fn new(behavior: FfmpegBehavior) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let ffmpeg_log = dir.path().join("ffmpeg_calls.log");
        let ffmpeg = fake_ffmpeg(&bin, &ffmpeg_log, behavior);
        fake_ffprobe(&bin);

        Self {
            dir,
            server: MockServer::start().await,
            ffmpeg,
            ffmpeg_log,
        }
    }

    /// Recording URL for `token` on the mock host
    pub fn url(&self, token: &str) -> String {
        format!("{}/{}/?launcher=false", self.server.uri(), token)
    }

    /// Directory finished recordings land in
    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("recordings")
    }

    /// Parent of every job workspace
    pub fn work_dir(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    /// Job workspaces still present
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(self.work_dir())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Config pointing at the stand-in binaries, with fast retries and no hardware probing
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.batch.output_dir = self.output_dir();
        config.batch.temp_dir = Some(self.work_dir());
        config.batch.fetch_concurrency = 2;
        config.batch.file_collision = FileCollisionAction::Rename;
        config.encoder.ffmpeg_path = Some(self.ffmpeg.clone());
        config.encoder.ffprobe_path = Some(self.dir.path().join("bin").join("ffprobe"));
        config.encoder.search_path = false;
        config.encoder.prefer_hardware = false;
        config.encoder.encode_timeout = Duration::from_secs(20);
        config.fetch.request_timeout = Duration::from_secs(5);
        config.retry.max_attempts = 1;
        config.retry.initial_delay = Duration::from_millis(10);
        config.retry.jitter = false;
        config
    }

    /// Pipeline built from [`config`](Self::config)
    pub async fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.config()).await.unwrap()
    }

    /// Pipeline that starts every job on `strategy`
    pub fn pipeline_with(&self, strategy: EncodingStrategy) -> Pipeline {
        let config = self.config();
        let muxer = connect_dl::encoder::Muxer::from_config(&config.encoder).unwrap();
        Pipeline::from_parts(config, strategy, muxer).unwrap()
    }

    /// Serve `archive` as the primary candidate for `token`
    pub async fn serve_archive(&self, token: &str, archive: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(format!("/{token}/output/{token}.zip")))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/zip")
                    .set_body_bytes(archive),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer archive requests for `token` with a login page and status 200
    pub async fn serve_login_page(&self, token: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/{token}/output/{token}.zip")))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string(LOGIN_PAGE),
            )
            .mount(&self.server)
            .await;
    }
}
