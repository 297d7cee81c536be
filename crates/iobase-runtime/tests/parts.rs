use iobase_runtime::{Access, File, MemDisk, PartIterator};

fn write_file(dir: &tempfile::TempDir, body: &[u8]) -> File {
    let path = dir.path().join("records");
    std::fs::write(&path, body).unwrap();
    File::open(&path, Access::RdOnly)
}

#[test]
fn part_iterator_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(&dir, b"a,bb,,ccc");

    let mut it = PartIterator::new(&file, b",", 4);
    assert_eq!(it.next(), Some(&b"a"[..]));
    assert_eq!(it.next(), Some(&b"bb"[..]));
    assert_eq!(it.next(), Some(&b"ccc"[..]));
    assert_eq!(it.next(), None);
    assert!(!it.is_alive());
}

#[test]
fn rejoined_parts_are_a_prefix_of_the_source() {
    let body = b"x;yy;;zzz;;;w;";
    let dir = tempfile::tempdir().unwrap();
    let file = write_file(&dir, body);

    for chunk in 1..=body.len() {
        let mut it = PartIterator::new(&file, b";", chunk);
        let mut parts = Vec::new();
        while let Some(p) = it.next() {
            parts.push(p.to_vec());
        }
        assert_eq!(parts.len(), 4, "chunk {}", chunk);
        let joined = parts.join(&b";"[..]);
        assert_eq!(joined, b"x;yy;zzz;w");
    }
}

#[test]
fn records_through_memdisk_spill() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = Vec::new();
    for i in 0..500 {
        body.extend_from_slice(format!("record-{}\n", i).as_bytes());
    }
    let file = write_file(&dir, &body);

    let mut out = MemDisk::new(1024, dir.path().join("spill.XXXXXX"));
    let mut it = PartIterator::new(&file, b"\n", 100);
    while let Some(rec) = it.next() {
        out.append(rec).append(b"\n");
    }

    assert!(out.is_spilled());
    assert!(out.finish());
    assert_eq!(out.data(), &body[..]);
}
