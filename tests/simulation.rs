use clothsim::config::{Backend, Params, RelaxMode};
use clothsim::error::{SimError, SimResult};
use clothsim::integrate::Forces;
use clothsim::layout::LaneLayout;
use clothsim::model::PointGrid;
use clothsim::offload::{Binding, Device, HostDevice};
use clothsim::{Simulation, StepObserver};

fn params(n: usize) -> Params {
    Params {
        grid_size: n,
        ..Params::default()
    }
}

fn bits(grid: &PointGrid) -> Vec<u32> {
    grid.data
        .iter()
        .flat_map(|p| {
            [p.pos[0], p.pos[1], p.prev[0], p.prev[1]]
                .map(f32::to_bits)
                .into_iter()
                .chain([p.rng.state])
        })
        .collect()
}

struct PinCheck {
    iterations: usize,
}

impl StepObserver for PinCheck {
    fn on_relax_iteration(&mut self, _step: usize, _iteration: usize, l: &LaneLayout) {
        for x in 0..l.map.width {
            let s = l.map.slot(x, 0);
            assert_eq!(l.pos_x[s].to_bits(), l.fix_x[s].to_bits());
            assert_eq!(l.pos_y[s].to_bits(), l.fix_y[s].to_bits());
        }
        self.iterations += 1;
    }
}

#[test]
fn top_row_is_pinned_after_every_relaxation_iteration() {
    let mut sim = Simulation::new(Params {
        wind_threshold: 5.0,
        ..params(24)
    })
    .unwrap();
    let mut check = PinCheck { iterations: 0 };
    for _ in 0..3 {
        sim.step_frame_observed(&mut check).unwrap();
    }
    assert_eq!(check.iterations, 3 * 3 * 4);
}

struct FirstIntegration {
    layout: Option<LaneLayout>,
}

impl StepObserver for FirstIntegration {
    fn on_integrate(&mut self, _step: usize, l: &LaneLayout) {
        if self.layout.is_none() {
            self.layout = Some(l.clone());
        }
    }
}

#[test]
fn calm_four_by_four_falls_by_exactly_g() {
    let p = Params {
        jitter: 0.0,
        wind_threshold: 0.0,
        backend: Backend::Scalar,
        relax_mode: RelaxMode::Sequential,
        ..params(4)
    };
    let g = p.gravity;
    let mut sim = Simulation::new(p).unwrap();
    let start = sim.snapshot().unwrap();

    let mut first = FirstIntegration { layout: None };
    sim.step_frame_observed(&mut first).unwrap();
    let after = first.layout.unwrap();
    for y in 0..4 {
        for x in 0..4 {
            let before = start.get(x, y).pos;
            assert_eq!(after.position(x, y), [before[0], before[1] + g]);
        }
    }

    let end = sim.snapshot().unwrap();
    for x in 0..4 {
        assert_eq!(end.get(x, 0).pos, start.get(x, 0).fix);
    }
}

#[test]
fn every_execution_path_gives_the_same_cloth() {
    let base = Params {
        wind_threshold: 3.0,
        backend: Backend::Scalar,
        relax_mode: RelaxMode::Sequential,
        ..params(24)
    };
    let run = |backend, relax_mode| {
        let mut sim = Simulation::new(Params {
            backend,
            relax_mode,
            ..base.clone()
        })
        .unwrap();
        for _ in 0..4 {
            sim.step_frame().unwrap();
        }
        bits(&sim.snapshot().unwrap())
    };

    let reference = run(Backend::Scalar, RelaxMode::Sequential);
    for (backend, mode) in [
        (Backend::Lanes, RelaxMode::Lanes),
        (Backend::Parallel, RelaxMode::Parallel),
        (Backend::Parallel, RelaxMode::Sequential),
        (Backend::Offload, RelaxMode::Parallel),
        (Backend::Offload, RelaxMode::Lanes),
    ] {
        assert!(run(backend, mode) == reference, "{:?} / {:?}", backend, mode);
    }
}

#[test]
fn explicit_device_matches_host_integration() {
    let p = Params {
        wind_threshold: 3.0,
        ..params(12)
    };
    let device = HostDevice::new(Forces::new(&p, 0.0));
    let mut offloaded = Simulation::with_device(p.clone(), Box::new(device)).unwrap();
    assert_eq!(offloaded.params().backend, Backend::Offload);
    let mut host = Simulation::new(p).unwrap();
    for _ in 0..3 {
        offloaded.step_frame().unwrap();
        host.step_frame().unwrap();
    }
    assert!(bits(&offloaded.snapshot().unwrap()) == bits(&host.snapshot().unwrap()));
}

/// Host device whose first position readback is lost.
struct LosesFirstReadback {
    inner: HostDevice,
    lost: bool,
}

impl Device for LosesFirstReadback {
    fn name(&self) -> &str {
        "loses-first-readback"
    }
    fn allocate(&mut self, dims: [u32; 2]) -> SimResult<()> {
        self.inner.allocate(dims)
    }
    fn write(&mut self, binding: Binding, bytes: &[u8]) -> SimResult<()> {
        self.inner.write(binding, bytes)
    }
    fn read(&mut self, binding: Binding, out: &mut [u8]) -> SimResult<()> {
        if binding == Binding::Positions && !self.lost {
            self.lost = true;
            return Err(SimError::Transfer {
                message: "readback lost".into(),
            });
        }
        self.inner.read(binding, out)
    }
    fn dispatch_integrate(&mut self, dims: [u32; 2], drift: f32) -> SimResult<()> {
        self.inner.dispatch_integrate(dims, drift)
    }
}

#[test]
fn failed_transfer_stops_the_run_until_reset() {
    let p = Params {
        wind_threshold: 3.0,
        ..params(12)
    };
    let device = LosesFirstReadback {
        inner: HostDevice::new(Forces::new(&p, 0.0)),
        lost: false,
    };
    let mut sim = Simulation::with_device(p.clone(), Box::new(device)).unwrap();
    assert!(matches!(sim.step_frame(), Err(SimError::Transfer { .. })));
    // Later frames must not run on half-updated velocities.
    assert!(matches!(sim.step_frame(), Err(SimError::Transfer { .. })));
    assert!(sim.snapshot().is_err());

    sim.reset().unwrap();
    let mut clean = Simulation::new(p).unwrap();
    for _ in 0..2 {
        sim.step_frame().unwrap();
        clean.step_frame().unwrap();
    }
    assert!(bits(&sim.snapshot().unwrap()) == bits(&clean.snapshot().unwrap()));
}

#[test]
fn drift_grows_every_macro_step() {
    let p = params(12);
    let mut expected = p.wind_drift_start;
    let mut sim = Simulation::new(p.clone()).unwrap();
    assert_eq!(sim.drift(), expected);
    for _ in 0..2 {
        let timings = sim.step_frame().unwrap();
        let names: Vec<&str> = timings.iter().map(|t| t.name).collect();
        assert_eq!(names, ["integrate", "relax", "TOTAL"]);
        for _ in 0..p.macro_steps {
            expected += p.wind_drift_step;
        }
    }
    assert_eq!(sim.drift(), expected);
    assert_eq!(sim.frame(), 2);
}

#[test]
fn reset_returns_to_the_initial_cloth() {
    let mut fresh = Simulation::new(params(12)).unwrap();
    let mut sim = Simulation::new(params(12)).unwrap();
    for _ in 0..3 {
        sim.step_frame().unwrap();
    }
    sim.reset().unwrap();
    assert_eq!(sim.frame(), 0);
    assert_eq!(sim.drift(), fresh.drift());
    assert!(bits(&sim.snapshot().unwrap()) == bits(&fresh.snapshot().unwrap()));
}

#[test]
fn offloaded_reset_uploads_fresh_state() {
    let p = Params {
        backend: Backend::Offload,
        wind_threshold: 3.0,
        ..params(12)
    };
    let mut a = Simulation::new(p.clone()).unwrap();
    let mut b = Simulation::new(p).unwrap();
    for _ in 0..2 {
        a.step_frame().unwrap();
    }
    a.reset().unwrap();
    a.step_frame().unwrap();
    b.step_frame().unwrap();
    assert!(bits(&a.snapshot().unwrap()) == bits(&b.snapshot().unwrap()));
}

#[test]
fn seeds_control_the_run() {
    let run = |seed| {
        let mut sim = Simulation::new(Params {
            seed,
            wind_threshold: 1.0,
            ..params(12)
        })
        .unwrap();
        sim.step_frame().unwrap();
        bits(&sim.snapshot().unwrap())
    };
    assert!(run(1) == run(1));
    assert!(run(1) != run(2));
}

#[test]
fn exploding_cloth_keeps_stepping() {
    let mut sim = Simulation::new(Params {
        gravity: 1.0e38,
        ..params(12)
    })
    .unwrap();
    for _ in 0..4 {
        sim.step_frame().unwrap();
    }
    let l = sim.layout();
    assert!(l.pos_y.iter().any(|y| !y.is_finite()));
    // the pinned row never leaves its target
    for x in 0..12 {
        let s = l.map.slot(x, 0);
        assert_eq!(l.pos_y[s], l.fix_y[s]);
    }
}

#[test]
fn rejects_degenerate_configuration() {
    for p in [
        params(0),
        Params {
            relax_iterations: 0,
            ..params(8)
        },
        Params {
            macro_steps: 0,
            ..params(8)
        },
        params(60_000),
    ] {
        assert!(matches!(
            Simulation::new(p),
            Err(SimError::InvalidConfig { .. })
        ));
    }
}

#[test]
fn renderer_reads_positions_by_logical_coordinate() {
    let sim = Simulation::new(params(24)).unwrap();
    let logical = sim.positions();
    for y in 0..24 {
        for x in 0..24 {
            let s = sim.index_map().slot(x, y);
            assert_eq!(*logical.get(x, y), [sim.layout().pos_x[s], sim.layout().pos_y[s]]);
        }
    }
}
