//! Scans the cylinder radius and prints how many runs each radius produces.
//!
//! cargo run --example residence_scan -- system.pdb traj.dcd "name OH2" "name CA"

use restime::{
    BinGeometry, DcdReader, ReferenceAligner, ResidenceAnalysis, Selection, SubMinimumPolicy,
    Thresholds, Topology,
};
use std::error::Error;
use std::time::Instant;

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let usage = "Usage: cargo run --example residence_scan <file.pdb> <file.dcd> <selection> <reference>";
    let pdb = args.next().expect(usage);
    let dcd = args.next().expect(usage);
    let sel = args.next().expect(usage);
    let reference = args.next().expect(usage);

    let topology = Topology::from_pdb(&pdb)?;
    let selection = Selection::parse(&sel, &topology)?;
    let reference = Selection::parse(&reference, &topology)?;
    println!(
        "{} atoms, {} selected, {} in the reference",
        topology.n_atoms(),
        selection.len(),
        reference.len()
    );

    for radius in [2.0, 4.0, 6.0, 8.0] {
        let start = Instant::now();
        let mut reader = DcdReader::open(&dcd)?;
        let mut aligner = ReferenceAligner::new(&topology, reference.clone())?;
        let geometry = BinGeometry::new(-20.0, 20.0, 8, radius)?;
        let thresholds = Thresholds::new(&[5, 50], SubMinimumPolicy::Report)?;

        let report = ResidenceAnalysis::new(geometry, selection.clone(), thresholds)
            .run(&mut reader, &mut aligner)?;

        let totals = report.histogram.bucket_totals();
        let labels: Vec<_> = report.histogram.buckets.iter().map(|b| b.label.as_str()).collect();
        println!(
            "radius {:>4.1}: {} frames in {:.2?}, runs per bucket {:?} = {:?}",
            radius,
            report.frames,
            start.elapsed(),
            labels,
            totals
        );
    }

    Ok(())
}
