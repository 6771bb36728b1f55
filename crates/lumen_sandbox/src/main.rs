use anyhow::bail;
use clap::Parser;
use log::*;
use lumen::{
    config::DirectorySource,
    graphic::Graphic,
    handler::{ComponentDisplayable, ComponentRefreshable, HandlerListener},
    models::{Layerable, Shape, Transformable},
    services::{Constructor, Injectable},
    Factory, Featurable, Handler, HandlerPersister, Media, Services,
};
use lumen_utils::{ok, AnyResult, AnyhowResultExt};
use std::{
    cell::Cell,
    fs::File,
    io::{BufReader, BufWriter, Write},
    process,
    rc::Rc,
};

pub mod cli;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Spacing between spawned entities.
const GRID_STEP: f64 = 32.0;

/// Per-run counters, shared through [`Services`].
#[derive(Default)]
struct FrameStats {
    frames: Cell<u32>,
    rects: Cell<usize>,
}

impl Injectable for FrameStats {
    fn constructors() -> Vec<Constructor<Self>> {
        vec![Constructor::new(|_| Ok(FrameStats::default()))]
    }
}

/// Doesn't draw anything, only counts and traces draw calls.
struct TracingGraphic {
    stats: Rc<FrameStats>,
}

impl Graphic for TracingGraphic {
    fn draw_rect(&mut self, x: f64, y: f64, width: i32, height: i32) {
        trace!("rect {width}x{height} at ({x:.1}, {y:.1})");
        self.stats.rects.set(self.stats.rects.get() + 1);
    }
}

struct SpawnLog;

impl HandlerListener for SpawnLog {
    fn notify_handlable_added(&mut self, featurable: &Featurable) {
        debug!(
            "Spawned {:?} from {:?}",
            featurable.id(),
            featurable.media().map(Media::path)
        );
    }

    fn notify_handlable_removed(&mut self, featurable: &Featurable) {
        debug!("Despawned {:?}", featurable.id());
    }
}

fn new_handler() -> AnyResult<Handler> {
    let mut handler = Handler::new();
    handler.add_component_updater(ComponentRefreshable::new())?;
    handler.add_component_renderer(ComponentDisplayable::new())?;
    handler.add_listener(SpawnLog);
    Ok(handler)
}

fn spawn_grid(handler: &mut Handler, factory: &Factory, media: &Media, grid: u32) -> AnyResult {
    for row in 0..grid {
        for column in 0..grid {
            let mut featurable = factory.create(media)?;
            if let Ok(transformable) = featurable.get_feature_mut::<dyn Transformable>() {
                transformable.teleport(column as f64 * GRID_STEP, row as f64 * GRID_STEP);
            }
            if let Ok(layerable) = featurable.get_feature_mut::<dyn Layerable>() {
                let refresh = layerable.layer_refresh();
                layerable.set_layer(refresh, row as i32);
            }
            handler.add(featurable)?;
        }
    }
    ok()
}

fn positions(handler: &Handler) -> Vec<(f64, f64)> {
    handler
        .iter()
        .filter_map(|featurable| featurable.get_feature::<dyn Shape>().ok())
        .map(|shape| (shape.x(), shape.y()))
        .collect()
}

fn run(args: cli::Args) -> AnyResult {
    let services = Services::new();
    let stats = services.create::<FrameStats>()?;
    let factory =
        Factory::new(DirectorySource::new(&args.data), services.clone()).with_defaults();
    let media = Media::new(args.media.as_str());

    let mut handler = new_handler()?;
    spawn_grid(&mut handler, &factory, &media, args.grid)?;

    let mut graphic = TracingGraphic {
        stats: services.get::<FrameStats>()?,
    };
    for _ in 0..args.ticks {
        handler.update(args.extrp)?;
        handler.render(&mut graphic)?;
        stats.frames.set(stats.frames.get() + 1);
    }

    info!(
        "Ran {} frame(s) over {} entities, {} rect(s) drawn",
        stats.frames.get(),
        handler.size(),
        stats.rects.get()
    );

    let Some(path) = args.save else {
        return ok();
    };

    let mut writer = BufWriter::new(
        File::create(&path).otherwise_with(|| format!("couldn't create {}", path.display()))?,
    );
    let saved = HandlerPersister::new().save(&handler, &mut writer)?;
    writer.flush()?;
    drop(writer);
    info!("Saved {saved} entities into {}", path.display());

    let mut restored = new_handler()?;
    let mut reader = BufReader::new(
        File::open(&path).otherwise_with(|| format!("couldn't reopen {}", path.display()))?,
    );
    HandlerPersister::new().load(&mut restored, &factory, &mut reader)?;
    restored.update(0.0)?;

    if positions(&restored) != positions(&handler) {
        bail!("the restored world differs from the saved one");
    }
    info!("Restored {} entities, round trip OK", restored.size());

    ok()
}

pub fn main() {
    let args = cli::Args::parse();

    pretty_env_logger::formatted_builder()
        .format_indent(None)
        .format_timestamp(None)
        .filter_level(if args.verbose {
            LevelFilter::Trace
        } else {
            LevelFilter::Info
        })
        .init();

    info!("Lumen sandbox {VERSION}");

    if let Err(error) = run(args) {
        error!("{error:#}");
        process::exit(1);
    }
}
