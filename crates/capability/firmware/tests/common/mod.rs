//! 测试用模拟服务：厂商下载端点与设备 Web 界面。

#![allow(dead_code)]

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

// ============================================
// 厂商下载端点
// ============================================

#[derive(Debug, Clone)]
pub struct VendorFile {
    pub status: StatusCode,
    /// `None` 表示不返回 Content-Disposition
    pub filename: Option<String>,
    pub size: usize,
    pub delay: Duration,
}

impl VendorFile {
    pub fn new(filename: &str, size: usize) -> Self {
        Self {
            status: StatusCode::OK,
            filename: Some(filename.to_string()),
            size,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
pub struct Vendor {
    pub addr: SocketAddr,
    files: Arc<Mutex<HashMap<String, VendorFile>>>,
    hits: Arc<Mutex<usize>>,
}

impl Vendor {
    pub async fn start() -> Self {
        let files = Arc::new(Mutex::new(HashMap::new()));
        let hits = Arc::new(Mutex::new(0));
        let app = Router::new()
            .route("/:family", get(vendor_download))
            .with_state((files.clone(), hits.clone()));
        let addr = serve(app).await;
        Self { addr, files, hits }
    }

    pub fn url(&self, family: &str) -> String {
        format!("http://{}/{}", self.addr, family)
    }

    pub fn set(&self, family: &str, file: VendorFile) {
        self.files
            .lock()
            .unwrap()
            .insert(family.to_string(), file);
    }

    pub fn hits(&self) -> usize {
        *self.hits.lock().unwrap()
    }
}

type VendorState = (Arc<Mutex<HashMap<String, VendorFile>>>, Arc<Mutex<usize>>);

async fn vendor_download(
    State((files, hits)): State<VendorState>,
    axum::extract::Path(family): axum::extract::Path<String>,
) -> Response {
    *hits.lock().unwrap() += 1;
    let file = files.lock().unwrap().get(&family).cloned();
    let Some(file) = file else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if !file.delay.is_zero() {
        tokio::time::sleep(file.delay).await;
    }
    let body = firmware_bytes(file.size);
    match file.filename {
        Some(name) => (
            file.status,
            [(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}\""),
            )],
            body,
        )
            .into_response(),
        None => (file.status, body).into_response(),
    }
}

pub fn firmware_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

// ============================================
// 设备 Web 界面
// ============================================

const LOGIN_FORM: &str = r#"<!DOCTYPE html><html><body><form method="POST">
<div><p style="{style}">Incorrect password!</p></div>
<input name="1" value="">
<input type="password" name="2" value="">
<input type="submit" value="Login"></form></body></html>"#;

const UPLOAD_FORM: &str = r#"<!DOCTYPE html><html><body>
<form class="l" method="post" action="/">
<label>user <input name="4" value="Logout" type="submit"></label></form>
<form class="f" method="post" enctype="multipart/form-data">
<input type="file" name="11111"><input type="submit" id="bs" value="Upload">
<p>{status}</p></form></body></html>"#;

fn login_form(show_error: bool) -> Html<String> {
    let style = if show_error { "" } else { "display:none" };
    Html(LOGIN_FORM.replace("{style}", style))
}

fn upload_form(status: &str) -> Html<String> {
    Html(UPLOAD_FORM.replace("{status}", status))
}

/// 上传阶段设备的行为。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadBehaviour {
    Accept,
    RejectFile,
    HttpError,
    ForgetSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFirmware {
    pub filename: String,
    pub content_type: String,
    pub bytes: usize,
    pub username: String,
}

#[derive(Debug)]
pub struct DeviceState {
    pub username: String,
    pub password: String,
    pub authenticated: bool,
    pub logins: usize,
    pub logouts: usize,
    pub requests: usize,
    pub received: Vec<ReceivedFirmware>,
    pub behaviour: UploadBehaviour,
    pub fail_logout: bool,
}

#[derive(Clone)]
pub struct Device {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<DeviceState>>,
}

impl Device {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(DeviceState {
            username: "user".to_string(),
            password: "user".to_string(),
            authenticated: false,
            logins: 0,
            logouts: 0,
            requests: 0,
            received: Vec::new(),
            behaviour: UploadBehaviour::Accept,
            fail_logout: false,
        }));
        let app = Router::new()
            .route("/g1.html", post(device_g1))
            .route("/", post(device_logout))
            .with_state(state.clone());
        let addr = serve(app).await;
        Self { addr, state }
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

type SharedDevice = Arc<Mutex<DeviceState>>;

async fn device_g1(State(state): State<SharedDevice>, request: Request) -> Response {
    state.lock().unwrap().requests += 1;
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, &()).await.expect("multipart");
        return device_upload(state, multipart).await;
    }

    let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
        .await
        .expect("form");
    let mut device = state.lock().unwrap();
    device.logins += 1;
    let ok = fields.get("1") == Some(&device.username) && fields.get("2") == Some(&device.password);
    if ok {
        device.authenticated = true;
        upload_form("").into_response()
    } else {
        login_form(true).into_response()
    }
}

async fn device_upload(state: SharedDevice, mut multipart: Multipart) -> Response {
    let (authenticated, behaviour) = {
        let device = state.lock().unwrap();
        (device.authenticated, device.behaviour)
    };
    if !authenticated || behaviour == UploadBehaviour::ForgetSession {
        return login_form(false).into_response();
    }

    let mut received = ReceivedFirmware {
        filename: String::new(),
        content_type: String::new(),
        bytes: 0,
        username: String::new(),
    };
    while let Some(field) = multipart.next_field().await.expect("field") {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("11111") => {
                received.filename = field.file_name().unwrap_or_default().to_string();
                received.content_type = field.content_type().unwrap_or_default().to_string();
                received.bytes = field.bytes().await.expect("bytes").len();
            }
            Some("1") => received.username = field.text().await.expect("text"),
            _ => {}
        }
    }

    match behaviour {
        UploadBehaviour::HttpError => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        UploadBehaviour::RejectFile => {
            upload_form("Status: Firmware upload error: invalid file header").into_response()
        }
        _ => {
            state.lock().unwrap().received.push(received);
            upload_form("Status: Firmware uploaded successfully, device is restarting.")
                .into_response()
        }
    }
}

async fn device_logout(
    State(state): State<SharedDevice>,
    Form(fields): Form<HashMap<String, String>>,
) -> Response {
    let mut device = state.lock().unwrap();
    if device.fail_logout {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    if fields.get("4").map(String::as_str) == Some("Logout") {
        device.authenticated = false;
        device.logouts += 1;
    }
    login_form(false).into_response()
}
