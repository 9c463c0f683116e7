//! GRASS GIS engine: modules run as child processes
//!
//! Must run inside a GRASS session (`grass --exec cumview ...`) so the
//! modules find their database. The computation region is never read from
//! or written to the mapset: every module call gets its region through its
//! own `GRASS_REGION` environment variable, so concurrent calls with
//! different regions cannot interfere.

use super::{is_bounded, ViewshedRequest, VisibilityEngine};
use crate::error::EngineError;
use crate::region::Region;
use cumview_core::{GeoTransform, GridSpec, RasterName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Settings for running GRASS modules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrassConfig {
    /// Directory holding the module executables; `PATH` is searched when unset
    pub bin_dir: Option<PathBuf>,
    /// Wall-clock limit for one module call, in seconds
    pub timeout_secs: u64,
    /// Projection code of the location (99 = other projection)
    pub proj: i32,
    /// Projection zone of the location
    pub zone: i32,
    /// Memory for `r.viewshed`, in MB
    pub memory_mb: Option<u32>,
}

impl Default for GrassConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            timeout_secs: 600,
            proj: 99,
            zone: 0,
            memory_mb: None,
        }
    }
}

impl GrassConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Engine delegating to `r.viewshed`, `r.series`, `r.mapcalc` and `r.info`
#[derive(Debug)]
pub struct GrassEngine {
    config: GrassConfig,
    grids: Mutex<HashMap<RasterName, GridSpec>>,
}

impl GrassEngine {
    pub fn new(config: GrassConfig) -> Self {
        Self {
            config,
            grids: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GrassConfig {
        &self.config
    }

    /// Build the command line for one module call
    pub fn command(&self, module: &str, args: &[String], region: Option<&Region>) -> Command {
        let program = match &self.config.bin_dir {
            Some(dir) => dir.join(module),
            None => PathBuf::from(module),
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(region) = region {
            cmd.env("GRASS_REGION", region.to_grass_region(self.config.proj, self.config.zone));
        }
        cmd
    }

    fn run(&self, module: &str, args: &[String], region: Option<&Region>) -> Result<String, EngineError> {
        debug!("Running {} {}", module, args.join(" "));
        let mut cmd = self.command(module, args, region);
        run_with_timeout(&mut cmd, module, self.config.timeout())
    }

    fn cache_grid(&self, name: &RasterName, grid: GridSpec) {
        if let Ok(mut grids) = self.grids.lock() {
            grids.insert(name.clone(), grid);
        }
    }

    fn forget_grid(&self, name: &RasterName) {
        if let Ok(mut grids) = self.grids.lock() {
            grids.remove(name);
        }
    }
}

impl VisibilityEngine for GrassEngine {
    fn name(&self) -> &'static str {
        "grass"
    }

    fn grid(&self, raster: &RasterName) -> Result<GridSpec, EngineError> {
        if let Some(grid) = self.grids.lock().ok().and_then(|g| g.get(raster).copied()) {
            return Ok(grid);
        }

        let args = vec!["-g".to_string(), format!("map={}", raster)];
        let info = match self.run("r.info", &args, None) {
            Ok(out) => out,
            Err(EngineError::Module { .. }) => return Err(EngineError::MissingRaster(raster.to_string())),
            Err(e) => return Err(e),
        };
        let grid = parse_raster_info(&info)?;
        self.cache_grid(raster, grid);
        Ok(grid)
    }

    fn viewshed(&self, request: &ViewshedRequest<'_>) -> Result<RasterName, EngineError> {
        let grid = self.grid(request.elevation)?;
        if grid.cell_of(request.x, request.y).is_none() {
            return Err(EngineError::InvalidObserver {
                x: request.x,
                y: request.y,
                reason: format!("outside elevation raster '{}'", request.elevation),
            });
        }

        let max_distance = if is_bounded(request.max_distance) {
            request.max_distance
        } else {
            -1.0
        };
        let mut args = vec![
            format!("input={}", request.elevation),
            format!("output={}", request.output),
            format!("coordinates={},{}", request.x, request.y),
            format!("observer_elevation={}", request.observer_elevation),
            format!("target_elevation={}", request.target_elevation),
            format!("max_distance={}", max_distance),
        ];
        if let Some(mb) = self.config.memory_mb {
            args.push(format!("memory={}", mb));
        }
        args.push("--overwrite".into());
        args.push("--quiet".into());

        let region = request.region.unwrap_or_else(|| Region::from_grid(&grid));
        self.run("r.viewshed", &args, Some(&region))?;
        self.cache_grid(request.output, region.grid());
        Ok(request.output.clone())
    }

    fn count(&self, inputs: &[RasterName], template: &GridSpec, output: &RasterName) -> Result<RasterName, EngineError> {
        // Restricted viewsheds cover only part of the template
        for name in inputs {
            template.ensure_contains(&self.grid(name)?, name.as_str())?;
        }

        let region = Region::from_grid(template);
        if inputs.is_empty() {
            let args = vec![
                format!("expression={} = null()", output),
                "--overwrite".to_string(),
                "--quiet".to_string(),
            ];
            self.run("r.mapcalc", &args, Some(&region))?;
        } else {
            let list = write_input_list(inputs)?;
            self.run("r.series", &series_args(list.path(), output), Some(&region))?;

            // r.series writes 0 where no input is defined
            let args = vec![format!("map={}", output), "setnull=0".to_string(), "--quiet".to_string()];
            self.run("r.null", &args, Some(&region))?;
        }

        self.cache_grid(output, *template);
        Ok(output.clone())
    }

    fn remove(&self, raster: &RasterName) -> Result<bool, EngineError> {
        self.forget_grid(raster);

        let find = vec!["element=cell".to_string(), format!("file={}", raster), "--quiet".to_string()];
        match self.run("g.findfile", &find, None) {
            Ok(_) => {}
            Err(EngineError::Module { .. }) => return Ok(false),
            Err(e) => return Err(e),
        }

        let args = vec![
            "-f".to_string(),
            "type=raster".to_string(),
            format!("name={}", raster),
            "--quiet".to_string(),
        ];
        self.run("g.remove", &args, None)?;
        Ok(true)
    }
}

/// Write raster names one per line, for modules taking `file=`
pub(crate) fn write_input_list(inputs: &[RasterName]) -> Result<NamedTempFile, EngineError> {
    let io = |e: std::io::Error| EngineError::from(cumview_core::Error::from(e));

    let mut file = tempfile::Builder::new()
        .prefix("cumview_series_")
        .suffix(".txt")
        .tempfile()
        .map_err(io)?;
    for name in inputs {
        writeln!(file, "{}", name).map_err(io)?;
    }
    file.flush().map_err(io)?;
    Ok(file)
}

/// `r.series` arguments reading the input names from `list`
pub(crate) fn series_args(list: &Path, output: &RasterName) -> Vec<String> {
    vec![
        format!("file={}", list.display()),
        "method=count".to_string(),
        format!("output={}", output),
        "--overwrite".to_string(),
        "--quiet".to_string(),
    ]
}

/// Parse the `key=value` output of `r.info -g` into a grid
pub fn parse_raster_info(text: &str) -> Result<GridSpec, EngineError> {
    let values: HashMap<&str, &str> = text
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let field = |key: &str| -> Result<&str, EngineError> {
        values.get(key).copied().ok_or_else(|| EngineError::Parse {
            what: "r.info output".into(),
            detail: format!("missing '{}'", key),
        })
    };
    let float = |key: &str| -> Result<f64, EngineError> {
        let v = field(key)?;
        v.parse::<f64>().map_err(|_| EngineError::Parse {
            what: "r.info output".into(),
            detail: format!("'{}' is not a number: {}", key, v),
        })
    };
    let count = |key: &str| -> Result<usize, EngineError> {
        let v = field(key)?;
        v.parse::<usize>().map_err(|_| EngineError::Parse {
            what: "r.info output".into(),
            detail: format!("'{}' is not a cell count: {}", key, v),
        })
    };

    let (west, north) = (float("west")?, float("north")?);
    let (ewres, nsres) = (float("ewres")?, float("nsres")?);
    let (rows, cols) = (count("rows")?, count("cols")?);

    Ok(GridSpec::new(GeoTransform::new(west, north, ewres, -nsres), rows, cols))
}

/// Run a command to completion, killing it once `timeout` has elapsed.
///
/// Returns the captured stdout. A non-zero exit becomes `Module` carrying
/// the captured stderr; an expired timeout becomes `Timeout`.
pub(crate) fn run_with_timeout(cmd: &mut Command, module: &str, timeout: Duration) -> Result<String, EngineError> {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| EngineError::Spawn {
        program: module.to_string(),
        source,
    })?;

    // Drain both pipes so a chatty module never blocks on a full buffer
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if start.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                warn!("{} killed after {:?}", module, start.elapsed());
                return Err(EngineError::Timeout {
                    module: module.to_string(),
                    elapsed: start.elapsed(),
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                return Err(EngineError::Spawn {
                    program: module.to_string(),
                    source,
                })
            }
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if !status.success() {
        return Err(EngineError::Module {
            module: module.to_string(),
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(stdout)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}
