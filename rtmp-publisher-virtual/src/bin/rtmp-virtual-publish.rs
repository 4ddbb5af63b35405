//! Drive one virtual session end to end: test pattern in, TCP relay out.
//!
//! ```text
//! RUST_LOG=info rtmp-virtual-publish rtmp://127.0.0.1:1935/live --name cam --seconds 5
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use parking_lot::Mutex;
use serde_json::{json, Value};

use rtmp_publisher_core::{
    CommandDispatcher, MethodCall, PublisherError, PublisherSettings, SessionEvent, SessionHandle,
    SessionState,
};
use rtmp_publisher_virtual::{DesktopPermissions, VirtualFactory};

type Dispatcher = CommandDispatcher<VirtualFactory, DesktopPermissions>;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(about = "Publish a generated test pattern through a virtual RTMP session")]
struct Args {
    /// Server base URL, e.g. rtmp://host:1935/live
    url: String,

    /// Stream name appended to the URL
    #[arg(long, default_value = "stream")]
    name: String,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 480)]
    height: u32,

    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Camera facing: front or back
    #[arg(long, default_value = "back")]
    camera: String,

    /// How long to stay connected
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Publisher settings as JSON, e.g. '{"audioBitrate":65536}'
    #[arg(long)]
    settings: Option<String>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[{}] {}", e.code(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), PublisherError> {
    let settings = match args.settings {
        Some(ref json) => PublisherSettings::from_json(json)?,
        None => PublisherSettings::default(),
    };
    let mut dispatcher = CommandDispatcher::new(
        VirtualFactory::default(),
        DesktopPermissions::new(),
        settings,
    );

    let id = call(&mut dispatcher, "alloc", Value::Null)?
        .as_u64()
        .ok_or_else(|| PublisherError::Backend("alloc returned no handle".into()))?;
    let handle = SessionHandle::new(id);

    let channel = handle.event_channel_name();
    let sink = Arc::new(move |event: &SessionEvent| {
        log::info!("{} <- {}", channel, event.to_wire());
    });
    dispatcher.subscribe(handle, sink)?;

    let configured = call(
        &mut dispatcher,
        "initCaptureConfig",
        json!({
            "tex": id,
            "width": args.width,
            "height": args.height,
            "fps": args.fps,
            "camera": args.camera,
        }),
    )?;
    if configured != Value::Bool(true) {
        return Err(PublisherError::PermissionDenied);
    }
    call(&mut dispatcher, "startPreview", json!({"tex": id}))?;
    call(
        &mut dispatcher,
        "connect",
        json!({"tex": id, "url": args.url, "name": args.name}),
    )?;

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut was_live = false;
    while Instant::now() < deadline {
        dispatcher.pump_timeout(Duration::from_millis(100));
        match dispatcher.session_state(handle)? {
            SessionState::Configured if was_live => {
                log::warn!("link dropped, stopping early");
                break;
            }
            SessionState::Configured => {
                return Err(PublisherError::ConnectFailure(format!(
                    "could not reach {}",
                    args.url
                )));
            }
            SessionState::Connected => was_live = true,
            _ => {}
        }
    }

    let diagnostics = dispatcher.registry().get(handle)?.diagnostics();
    match serde_json::to_string(&diagnostics) {
        Ok(json) => log::info!("diagnostics {}", json),
        Err(e) => log::warn!("failed to serialize diagnostics: {}", e),
    }

    if dispatcher.session_state(handle)?.has_link() {
        call(&mut dispatcher, "disconnect", json!({"tex": id}))?;
    }
    call(&mut dispatcher, "release", json!({"tex": id}))?;
    Ok(())
}

/// Issue a call and pump until its reply arrives.
fn call(dispatcher: &mut Dispatcher, method: &str, arguments: Value) -> Result<Value, PublisherError> {
    let slot = Arc::new(Mutex::new(None));
    let reply = Arc::clone(&slot);
    dispatcher.handle(&MethodCall::new(method, arguments), move |result| {
        *reply.lock() = Some(result)
    });

    let deadline = Instant::now() + REPLY_TIMEOUT;
    loop {
        if let Some(result) = slot.lock().take() {
            return result;
        }
        if Instant::now() >= deadline {
            return Err(PublisherError::Backend(format!("{} timed out", method)));
        }
        dispatcher.pump_timeout(Duration::from_millis(20));
    }
}
