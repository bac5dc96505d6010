//! In-memory stand-in for the reporting engine's REST surface.
//!
//! Folders hold uploaded files exactly as received (part name, file name,
//! content type, bytes) so tests can inspect what a client actually sent.
//! Tasks are recorded with their job document and a running/stopped state;
//! nothing is executed.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredFile {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Stopped,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_id: Uuid,
    pub status: TaskState,
    pub job: serde_json::Value,
}

#[derive(Debug)]
pub struct EngineState {
    pub folders: HashMap<Uuid, Vec<StoredFile>>,
    pub tasks: HashMap<Uuid, TaskStatus>,
    pub healthy: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            folders: HashMap::new(),
            tasks: HashMap::new(),
            healthy: true,
        }
    }
}

pub type Engine = Arc<RwLock<EngineState>>;

#[derive(Deserialize)]
pub struct DownloadQuery {
    pub filename: Option<String>,
}

pub fn app() -> Router {
    app_with_state(Engine::default())
}

pub fn app_with_state(engine: Engine) -> Router {
    Router::new()
        .route("/upload/{id}", post(upload))
        .route("/download/{id}", get(download))
        .route("/delete", delete(delete_all))
        .route("/delete/{id}", delete(delete_folder))
        .route("/task", delete(stop_all))
        .route("/task/{id}", post(run_task).delete(stop_task))
        .route("/status/all", get(all_status))
        .route("/status/{id}", get(task_status))
        .route("/health", get(health))
        .with_state(engine)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, Engine::default()).await
}

pub async fn run_with_state(listener: TcpListener, engine: Engine) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(engine)).await
}

async fn upload(
    State(engine): State<Engine>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<Uuid>, StatusCode> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?.to_vec();
        files.push(StoredFile {
            field_name,
            file_name,
            content_type,
            data,
        });
    }
    if files.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    tracing::info!(%id, files = files.len(), "upload stored");
    engine.write().await.folders.entry(id).or_default().extend(files);
    Ok(Json(id))
}

async fn download(
    State(engine): State<Engine>,
    Path(id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
) -> Result<Vec<u8>, StatusCode> {
    let engine = engine.read().await;
    let files = engine.folders.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    let file = match query.filename.as_deref() {
        Some(name) => files.iter().find(|f| f.file_name == name),
        None => files.first(),
    };
    file.map(|f| f.data.clone()).ok_or(StatusCode::NOT_FOUND)
}

async fn delete_all(State(engine): State<Engine>) -> StatusCode {
    engine.write().await.folders.clear();
    StatusCode::OK
}

async fn delete_folder(State(engine): State<Engine>, Path(id): Path<Uuid>) -> StatusCode {
    match engine.write().await.folders.remove(&id) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

async fn run_task(
    State(engine): State<Engine>,
    Path(id): Path<Uuid>,
    Json(job): Json<serde_json::Value>,
) -> Json<Uuid> {
    tracing::info!(%id, "task started");
    engine.write().await.tasks.insert(
        id,
        TaskStatus {
            task_id: id,
            status: TaskState::Running,
            job,
        },
    );
    Json(id)
}

async fn stop_task(State(engine): State<Engine>, Path(id): Path<Uuid>) -> StatusCode {
    match engine.write().await.tasks.get_mut(&id) {
        Some(task) => {
            task.status = TaskState::Stopped;
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn stop_all(State(engine): State<Engine>) -> StatusCode {
    for task in engine.write().await.tasks.values_mut() {
        task.status = TaskState::Stopped;
    }
    StatusCode::OK
}

async fn task_status(
    State(engine): State<Engine>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskStatus>, StatusCode> {
    let engine = engine.read().await;
    engine.tasks.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn all_status(State(engine): State<Engine>) -> Json<Vec<TaskStatus>> {
    let engine = engine.read().await;
    Json(engine.tasks.values().cloned().collect())
}

async fn health(State(engine): State<Engine>) -> (StatusCode, &'static str) {
    if engine.read().await.healthy {
        (StatusCode::OK, "Ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "")
    }
}
