mod common;

use common::{write_dcd, write_pdb, write_text, DcdFrame, DcdHeader};
use glam::Vec3;
use restime::{
    report::write_table, run_from_config, AnalysisConfig, BinGeometry, BoundaryPolicy, Frame,
    MemoryTrajectory, NoAlignment, ResidenceAnalysis, ResidenceError, Selection,
    SubMinimumPolicy, Thresholds,
};
use tempfile::{tempdir, TempDir};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Cylinder of radius 1 from z = 0 to z = n_bins, one unit per bin
fn unit_bins(n_bins: usize) -> BinGeometry {
    BinGeometry::new(0.0, n_bins as f64, n_bins, 1.0).unwrap()
}

/// Frames for one particle; `None` puts it far outside the cylinder
fn one_particle(bins: &[Option<usize>]) -> MemoryTrajectory {
    let frames = bins
        .iter()
        .map(|b| {
            let z = b.map(|b| b as f32 + 0.5).unwrap_or(-50.0);
            Frame::new(vec![Vec3::new(0.0, 0.0, z)])
        })
        .collect();
    MemoryTrajectory::new(1, frames).unwrap()
}

#[test]
fn ten_frames_in_one_bin_give_a_single_run() {
    init_logs();
    let mut traj = one_particle(&[Some(2); 10]);
    let report = ResidenceAnalysis::new(unit_bins(4), Selection::from_indices(vec![0]), Thresholds::unbounded())
        .record_runs(true)
        .run(&mut traj, &mut NoAlignment)
        .unwrap();

    assert_eq!(report.runs.len(), 1);
    assert_eq!((report.runs[0].bin, report.runs[0].length), (2, 10));
    assert_eq!(report.histogram.counts[2], vec![1]);
    assert_eq!(report.histogram.total_runs(), 1);
}

#[test]
fn absence_splits_a_stay_into_two_runs() {
    let bins = [Some(1), Some(1), Some(1), None, Some(1), Some(1), Some(1)];
    let mut traj = one_particle(&bins);
    let report = ResidenceAnalysis::new(unit_bins(2), Selection::from_indices(vec![0]), Thresholds::unbounded())
        .record_runs(true)
        .run(&mut traj, &mut NoAlignment)
        .unwrap();

    let runs: Vec<_> = report.runs.iter().map(|r| (r.bin, r.start_frame, r.length)).collect();
    assert_eq!(runs, vec![(1, 0, 3), (1, 4, 3)]);
}

#[test]
fn run_of_fifty_frames_is_bucketed_by_thresholds() {
    let mut bins = vec![Some(0); 50];
    bins.push(None);
    let mut traj = one_particle(&bins);
    let thresholds = Thresholds::new(&[5, 100, 500], SubMinimumPolicy::Report).unwrap();
    let report = ResidenceAnalysis::new(unit_bins(1), Selection::from_indices(vec![0]), thresholds)
        .run(&mut traj, &mut NoAlignment)
        .unwrap();

    assert_eq!(report.histogram.count(0, "[5,100)"), Some(1));
    assert_eq!(report.histogram.count(0, "(0,5)"), Some(0));
    assert_eq!(report.histogram.count(0, "[100,500)"), Some(0));
    assert_eq!(report.histogram.count(0, "[500,inf)"), Some(0));
}

#[test]
fn no_qualifying_particles_give_an_all_zero_report() {
    let mut traj = one_particle(&[None; 6]);
    let thresholds = Thresholds::new(&[2, 4], SubMinimumPolicy::Report).unwrap();
    let report = ResidenceAnalysis::new(unit_bins(3), Selection::from_indices(vec![0]), thresholds)
        .run(&mut traj, &mut NoAlignment)
        .unwrap();

    assert_eq!(report.frames, 6);
    assert_eq!(report.histogram.total_runs(), 0);
    assert!(report.histogram.entries().all(|(_, _, count)| count == 0));
    assert_eq!(report.occupancy, vec![0, 0, 0]);

    // An empty selection is just as valid
    let mut traj = one_particle(&[Some(0); 3]);
    let report = ResidenceAnalysis::new(unit_bins(3), Selection::from_indices(vec![]), Thresholds::unbounded())
        .run(&mut traj, &mut NoAlignment)
        .unwrap();
    assert_eq!(report.histogram.total_runs(), 0);
}

#[test]
fn cylinder_faces_are_outside() {
    let strict = BinGeometry::new(-5.0, 5.0, 5, 2.0).unwrap();
    assert_eq!(strict.bin_index_of(Vec3::new(0.0, 0.0, 5.0)), None);
    assert_eq!(strict.bin_index_of(Vec3::new(2.0, 0.0, 0.0)), None);
    assert_eq!(strict.bin_index_of(Vec3::new(0.0, 0.0, -5.0)), None);
    assert_eq!(strict.bin_index_of(Vec3::new(0.0, 0.0, 4.999)), Some(4));

    let half_open = strict.with_boundary(BoundaryPolicy::HalfOpen);
    assert_eq!(half_open.bin_index_of(Vec3::new(0.0, 0.0, -5.0)), Some(0));
    assert_eq!(half_open.bin_index_of(Vec3::new(0.0, 0.0, 5.0)), None);
}

/// Deterministic pseudo-random walk of `n` particles over `frames` frames
fn random_walk(n: usize, frames: usize) -> Vec<Frame> {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 40) as f32 / (1u64 << 24) as f32
    };
    let mut positions: Vec<Vec3> = (0..n)
        .map(|_| Vec3::new(next() - 0.5, next() - 0.5, next() * 4.0))
        .collect();
    (0..frames)
        .map(|_| {
            for p in positions.iter_mut() {
                *p += Vec3::new(next() - 0.5, next() - 0.5, next() - 0.5) * 0.6;
            }
            Frame::new(positions.clone())
        })
        .collect()
}

#[test]
fn repeated_passes_are_identical_and_conserve_occupancy() {
    let frames = random_walk(12, 200);
    let thresholds = Thresholds::new(&[3, 10], SubMinimumPolicy::Report).unwrap();
    let analysis = ResidenceAnalysis::new(
        BinGeometry::new(0.0, 4.0, 4, 1.0).unwrap(),
        Selection::from_indices((0..12).collect()),
        thresholds,
    )
    .record_runs(true);

    let mut first = MemoryTrajectory::new(12, frames.clone()).unwrap();
    let mut second = MemoryTrajectory::new(12, frames).unwrap();
    let a = analysis.run(&mut first, &mut NoAlignment).unwrap();
    let b = analysis.run(&mut second, &mut NoAlignment).unwrap();
    assert_eq!(a, b);

    // Every particle-frame belongs to exactly one run
    for bin in 0..4 {
        let covered: usize = a.runs.iter().filter(|r| r.bin == bin).map(|r| r.length).sum();
        assert_eq!(covered as u64, a.occupancy[bin]);
    }
    assert_eq!(a.histogram.total_runs() as usize, a.runs.len());
    for run in &a.runs {
        assert!(run.length >= 1);
        assert!(run.last_frame() < a.frames);
    }
}

const CA: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [4.0, 0.0, 0.0],
    [0.0, 3.0, 0.0],
    [0.0, 0.0, 2.0],
];

/// Two waters: one stays in bin 2, the other visits bin 0, leaves, then
/// settles in bin 3. Frames are shifted so superposition has work to do.
fn water_frames(range: std::ops::Range<usize>) -> Vec<DcdFrame> {
    let shift = [2.0f32, -1.0, 0.5];
    range
        .map(|f| {
            let w2 = match f {
                0 | 1 => [1.0, 0.0, -7.5],
                2 => [20.0, 0.0, 0.0],
                _ => [0.0, 1.0, 7.5],
            };
            let mut atoms: Vec<[f32; 3]> = CA.to_vec();
            atoms.push([1.0, 1.0, 2.5]);
            atoms.push(w2);
            let atoms = atoms
                .into_iter()
                .map(|p| [p[0] + shift[0], p[1] + shift[1], p[2] + shift[2]])
                .collect();
            DcdFrame::new([100.0, 100.0, 100.0], atoms)
        })
        .collect()
}

fn water_system(dir: &TempDir, tag: &str, second_istart: i32) -> String {
    let pdb = write_pdb(
        dir,
        &format!("{}.pdb", tag),
        &[
            ("CA", "ALA", CA[0]),
            ("CA", "GLY", CA[1]),
            ("CA", "ALA", CA[2]),
            ("CA", "GLY", CA[3]),
            ("OH2", "TIP3", [0.0, 0.0, 0.0]),
            ("OH2", "TIP3", [0.0, 0.0, 0.0]),
        ],
    );
    let header = |istart| DcdHeader {
        istart,
        nevery: 10,
        ..DcdHeader::default()
    };
    let first = write_dcd(dir, &format!("{}_1.dcd", tag), &header(0), &water_frames(0..4));
    let second = write_dcd(
        dir,
        &format!("{}_2.dcd", tag),
        &header(second_istart),
        &water_frames(4..7),
    );
    format!(
        "dcd1 {}\ndcd2 {}\npdb {}\nref name CA\nsel name OH2\nzmin -10\nzmax 10\nnbins 4\nrad 5\nthr 3\n",
        first.display(),
        second.display(),
        pdb.display()
    )
}

#[test]
fn input_file_drives_a_full_pass_over_two_trajectories() {
    init_logs();
    let dir = tempdir().unwrap();
    let input = write_text(&dir, "contiguous.inp", &water_system(&dir, "contiguous", 40));
    let config = AnalysisConfig::from_file(&input).unwrap();
    let report = run_from_config(&config, true).unwrap();

    assert_eq!(report.frames, 7);
    assert_eq!(report.n_particles, 2);
    assert_eq!(report.time_gaps, 0);
    assert_eq!(report.occupancy, vec![2, 0, 7, 4]);
    assert_eq!(
        report.histogram.counts,
        vec![vec![1, 0], vec![0, 0], vec![0, 1], vec![0, 1]]
    );

    let mut table = Vec::new();
    write_table(&report, &mut table).unwrap();
    let table = String::from_utf8(table).unwrap();
    let total = table.lines().last().unwrap();
    assert_eq!(total.split_whitespace().collect::<Vec<_>>(), vec!["total", "13", "1", "2"]);
}

#[test]
fn time_gap_between_files_splits_runs() {
    let dir = tempdir().unwrap();
    let input = write_text(&dir, "gap.inp", &water_system(&dir, "gap", 100));
    let config = AnalysisConfig::from_file(&input).unwrap();
    let report = run_from_config(&config, true).unwrap();

    assert_eq!(report.time_gaps, 1);
    assert_eq!(report.occupancy, vec![2, 0, 7, 4]);
    assert_eq!(
        report.histogram.counts,
        vec![vec![1, 0], vec![0, 0], vec![0, 2], vec![1, 1]]
    );

    let ignored = write_text(
        &dir,
        "gap_ignored.inp",
        &format!("{}timegap ignore\n", water_system(&dir, "gap_ignored", 100)),
    );
    let report = run_from_config(&AnalysisConfig::from_file(&ignored).unwrap(), false).unwrap();
    assert_eq!(report.time_gaps, 0);
    assert_eq!(report.histogram.counts[2], vec![0, 1]);
}

#[test]
fn json_input_is_equivalent_to_keywords() {
    let dir = tempdir().unwrap();
    let keywords = water_system(&dir, "json", 40);
    let value = |kw: &str| {
        keywords
            .lines()
            .find(|l| l.starts_with(kw))
            .and_then(|l| l.split_whitespace().nth(1))
            .unwrap()
            .to_string()
    };
    let json = serde_json::json!({
        "trajectories": [value("dcd1"), value("dcd2")],
        "pdb": value("pdb"),
        "reference": "name CA",
        "selection": "name OH2",
        "z_min": -10.0,
        "z_max": 10.0,
        "n_bins": 4,
        "radius": 5.0,
        "thresholds": [3],
    });
    let path = write_text(&dir, "json.json", &json.to_string());
    let from_json = run_from_config(&AnalysisConfig::from_file(&path).unwrap(), false).unwrap();
    let from_keywords =
        run_from_config(&AnalysisConfig::from_keywords(&keywords).unwrap(), false).unwrap();
    assert_eq!(from_json, from_keywords);
}

#[test]
fn structure_and_trajectory_must_agree_on_atoms() {
    let dir = tempdir().unwrap();
    let keywords = water_system(&dir, "mismatch", 40);
    let short_pdb = write_pdb(&dir, "short.pdb", &[("CA", "ALA", CA[0])]);
    let text: String = keywords
        .lines()
        .map(|l| {
            if l.starts_with("pdb") {
                format!("pdb {}\n", short_pdb.display())
            } else {
                format!("{}\n", l)
            }
        })
        .collect();
    let config = AnalysisConfig::from_keywords(&text).unwrap();
    assert!(matches!(
        run_from_config(&config, false),
        Err(ResidenceError::Config(_))
    ));
}
