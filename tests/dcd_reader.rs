mod common;

use common::{encode_dcd, write_dcd, DcdFrame, DcdHeader};
use glam::Vec3;
use restime::{DcdReader, DcdReaderBuilder, Endianness, TrajError, TrajectoryChain, TrajectoryReader};
use std::error::Error;
use tempfile::tempdir;

fn three_frames() -> Vec<DcdFrame> {
    (0..3)
        .map(|i| {
            let f = i as f32;
            DcdFrame::new(
                [30.0, 31.0, 32.0 + i as f64],
                vec![[f, 1.0, -2.0], [0.5, f * 2.0, 3.25]],
            )
        })
        .collect()
}

fn header(istart: i32, nevery: i32) -> DcdHeader {
    DcdHeader {
        istart,
        nevery,
        ..DcdHeader::default()
    }
}

#[test]
fn test_header_and_frames() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = write_dcd(&dir, "header.dcd", &header(100, 10), &three_frames());
    let mut reader = DcdReader::open(&path)?;

    assert_eq!(reader.num_frames(), 3);
    assert_eq!(reader.num_atoms(), 2);
    assert_eq!(reader.start_timestep(), 100);
    assert_eq!(reader.timestep_freq(), 10);
    assert_eq!(reader.end_timestep(), 120);
    assert_eq!(reader.endianness(), Endianness::Little);
    assert_eq!(reader.titles(), &["synthetic trajectory".to_string()]);

    let frame = reader.read_next()?.unwrap();
    assert_eq!(frame.timestep, 100);
    assert_eq!(frame.timestep_stride, 10);
    assert_eq!(frame.box_dimensions, [30.0, 31.0, 32.0, 90.0, 90.0, 90.0]);
    assert_eq!(frame.positions, vec![Vec3::new(0.0, 1.0, -2.0), Vec3::new(0.5, 0.0, 3.25)]);

    let last = reader.nth(1).unwrap()?;
    assert_eq!(last.timestep, 120);
    assert_eq!(last.box_dimensions[2], 34.0);
    assert!(reader.read_next()?.is_none());
    Ok(())
}

#[test]
fn test_big_endian_matches_little_endian() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let little = write_dcd(&dir, "little.dcd", &header(0, 1), &three_frames());
    let big_header = DcdHeader {
        big_endian: true,
        ..header(0, 1)
    };
    let big = write_dcd(&dir, "big.dcd", &big_header, &three_frames());

    let big_reader = DcdReader::open(&big)?;
    assert_eq!(big_reader.endianness(), Endianness::Big);
    let a: Vec<_> = DcdReader::open(&little)?.collect::<Result<_, _>>()?;
    let b: Vec<_> = big_reader.collect::<Result<_, _>>()?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn test_seek_skip_and_reset() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = write_dcd(&dir, "seek.dcd", &header(0, 5), &three_frames());
    let mut reader = DcdReaderBuilder::new(&path)
        .with_endianness(Endianness::Little)
        .build()?;

    reader.seek_frame(2)?;
    assert_eq!(reader.read_next()?.unwrap().timestep, 10);
    assert!(reader.seek_frame(3).is_err());

    reader.reset();
    reader.skip_next(1)?;
    assert_eq!(reader.read_next()?.unwrap().timestep, 5);
    assert!(reader.skip_next(2).is_err());
    Ok(())
}

#[test]
fn test_trailing_partial_frame_is_ignored() -> Result<(), Box<dyn Error>> {
    let mut bytes = encode_dcd(&header(0, 1), &three_frames());
    bytes.extend_from_slice(&[0u8; 10]);
    let dir = tempdir()?;
    let path = common::temp_path(&dir, "partial.dcd");
    std::fs::write(&path, bytes)?;

    let reader = DcdReader::open(&path)?;
    assert_eq!(reader.num_frames(), 3);
    assert_eq!(reader.count(), 3);
    Ok(())
}

#[test]
fn test_invalid_files_are_rejected() {
    let dir = tempdir().unwrap();
    let mut bytes = encode_dcd(&header(0, 1), &three_frames());
    bytes[4..8].copy_from_slice(b"VELD");
    let path = common::temp_path(&dir, "velocities.dcd");
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(DcdReader::open(&path), Err(TrajError::Format(_))));

    let mut bytes = encode_dcd(&header(0, 1), &three_frames());
    bytes[48..52].copy_from_slice(&0i32.to_le_bytes());
    let path = common::temp_path(&dir, "nocell.dcd");
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(DcdReader::open(&path), Err(TrajError::Validation(_))));
    assert!(DcdReaderBuilder::new(&path).skip_validation(true).build().is_ok());

    let path = common::write_text(&dir, "garbage.dcd", "not a trajectory at all");
    assert!(matches!(DcdReader::open(&path), Err(TrajError::Endianness(_))));
}

#[test]
fn test_chain_of_files() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let first = write_dcd(&dir, "chain1.dcd", &header(0, 10), &three_frames());
    let second = write_dcd(&dir, "chain2.dcd", &header(30, 10), &three_frames()[..2]);
    let mut chain = TrajectoryChain::open_dcd(&[&first, &second])?;

    assert_eq!(chain.n_segments(), 2);
    assert_eq!(chain.n_atoms(), 2);
    assert_eq!(chain.n_frames(), 5);
    assert_eq!(chain.segment_starts(), vec![0, 3]);

    let mut timesteps = Vec::new();
    while let Some(frame) = chain.read_next()? {
        timesteps.push(frame.timestep);
    }
    assert_eq!(timesteps, vec![0, 10, 20, 30, 40]);
    Ok(())
}

#[test]
fn test_chain_rejects_mismatched_atom_counts() {
    let dir = tempdir().unwrap();
    let two = write_dcd(&dir, "two_atoms.dcd", &header(0, 1), &three_frames());
    let one = write_dcd(
        &dir,
        "one_atom.dcd",
        &header(0, 1),
        &[DcdFrame::new([10.0, 10.0, 10.0], vec![[0.0, 0.0, 0.0]])],
    );
    assert!(matches!(
        TrajectoryChain::open_dcd(&[two, one]),
        Err(TrajError::Mismatch(_))
    ));
}

#[test]
fn test_fixtures_are_removed_with_their_directory() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let path = write_dcd(&dir, "scratch.dcd", &header(0, 1), &three_frames());
    let root = dir.path().to_path_buf();
    assert!(path.starts_with(&root));
    assert_eq!(DcdReader::open(&path)?.num_frames(), 3);

    dir.close()?;
    assert!(!path.exists());
    assert!(!root.exists());
    Ok(())
}
