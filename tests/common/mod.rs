#![allow(dead_code)]

use replay_viewer::backend::{Backend, BackendError, JobId, ProgressOut, StartParseIn};
use replay_viewer::timeline::Timeline;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Canned responses, consumed front to back.
#[derive(Default)]
pub struct Script {
    pub demos: Vec<String>,
    pub demos_error: Option<String>,
    pub starts: VecDeque<Result<String, String>>,
    pub progress: VecDeque<Result<ProgressOut, String>>,
    pub results: VecDeque<Result<Timeline, String>>,
    pub map_urls: HashMap<String, String>,
    pub assets: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub starts: Vec<(String, u32)>,
    pub progress: Vec<String>,
    pub results: usize,
    pub map_urls: Vec<String>,
    pub fetched: Vec<String>,
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<Calls>>,
}

impl ScriptedBackend {
    pub fn script(&self, f: impl FnOnce(&mut Script)) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }
}

impl Backend for ScriptedBackend {
    async fn list_demos(&self) -> Result<Vec<String>, BackendError> {
        let script = self.script.lock().unwrap();
        match &script.demos_error {
            Some(msg) => Err(BackendError::server(msg.clone())),
            None => Ok(script.demos.clone()),
        }
    }

    async fn start_parse(&self, req: &StartParseIn) -> Result<JobId, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .starts
            .push((req.name.clone(), req.every_n));
        match self.script.lock().unwrap().starts.pop_front() {
            Some(Ok(id)) => Ok(JobId(id)),
            Some(Err(msg)) => Err(BackendError::server(msg)),
            None => Ok(JobId("job-1".into())),
        }
    }

    async fn progress(&self, job: &JobId) -> Result<ProgressOut, BackendError> {
        self.calls.lock().unwrap().progress.push(job.0.clone());
        match self.script.lock().unwrap().progress.pop_front() {
            Some(Ok(out)) => Ok(out),
            Some(Err(msg)) => Err(BackendError::server(msg)),
            None => Ok(progress("running", 0, 0, None, "")),
        }
    }

    async fn result(&self, _job: &JobId) -> Result<Timeline, BackendError> {
        self.calls.lock().unwrap().results += 1;
        match self.script.lock().unwrap().results.pop_front() {
            Some(Ok(timeline)) => Ok(timeline),
            Some(Err(msg)) => Err(BackendError::server(msg)),
            None => Err(BackendError::server("no result scripted")),
        }
    }

    async fn map_url(&self, name: &str) -> Result<Option<String>, BackendError> {
        self.calls.lock().unwrap().map_urls.push(name.to_string());
        Ok(self.script.lock().unwrap().map_urls.get(name).cloned())
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        self.calls.lock().unwrap().fetched.push(url.to_string());
        self.script
            .lock()
            .unwrap()
            .assets
            .get(url)
            .cloned()
            .ok_or(BackendError::Status {
                status: 404,
                message: "not found".into(),
            })
    }
}

pub fn progress(
    status: &str,
    processed: u32,
    total: u32,
    percent: Option<f64>,
    message: &str,
) -> ProgressOut {
    ProgressOut {
        status: Some(status.to_string()),
        total_rounds: (total > 0).then_some(total),
        processed_rounds: Some(processed),
        percent,
        message: Some(message.to_string()),
        error: None,
    }
}

/// Round 1 has players but no samples; round 2 has two moving players.
pub fn demo_timeline() -> Timeline {
    Timeline::from_json(
        br##"{
            "map": "de_dust2",
            "rounds": [
                { "round": 1, "players": [ { "id": 1, "name": "alpha", "positions": [] } ] },
                { "round": 2, "players": [
                    { "id": 7, "name": "alpha", "color": "#00ff00",
                      "positions": [ {"x": 0, "y": 0, "tick": 0}, {"x": 5, "y": 5, "tick": 2}, {"x": 10, "y": 10, "tick": 4} ] },
                    { "id": "b", "positions": [ {"x": 10, "y": 0}, {"x": 0, "y": 10} ] }
                ] }
            ]
        }"##,
    )
    .expect("fixture timeline")
}

/// Three rounds where only the middle one has samples.
pub fn three_round_timeline() -> Timeline {
    Timeline::from_json(
        br##"{
            "map": "de_dust2",
            "rounds": [
                { "round": 1, "players": [ { "id": 1, "name": "alpha", "positions": [] } ] },
                { "round": 2, "players": [
                    { "id": 1, "name": "alpha", "positions": [ {"x": 0, "y": 0}, {"x": 4, "y": 2} ] },
                    { "id": 2, "name": "bravo", "positions": [ {"x": 8, "y": 8} ] }
                ] },
                { "round": 3, "players": [ { "id": 2, "name": "bravo", "positions": [] } ] }
            ]
        }"##,
    )
    .expect("fixture timeline")
}

pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode png");
    buf
}
