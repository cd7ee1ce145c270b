use chainfs::{ChainFs, FileBlockEmulator};

use log::info;

pub fn main() {
    env_logger::init();

    let disk = tempfile::NamedTempFile::new().unwrap();
    let mut fs: ChainFs<FileBlockEmulator> =
        ChainFs::open_or_create(disk.path(), 64).expect("Could not initialize disk emulator.");

    // Format the medium and open /
    let mut cwd = fs.init().expect("should format");
    fs.make_dir(&mut cwd, "notes").unwrap();
    fs.change_dir(&mut cwd, "notes").unwrap();
    fs.create_file(&mut cwd, "todo.txt").unwrap();

    let mut fh = fs.open_file(&cwd, "todo.txt").unwrap();
    fs.write(&mut fh, b"buy milk\nwater plants\n").unwrap();
    fs.seek(&mut fh, 0).unwrap();
    let mut buf = vec![0; fh.size()];
    fs.read(&mut fh, &mut buf).unwrap();
    fs.close_file(fh);

    info!("todo.txt: {:?}", String::from_utf8_lossy(&buf));
    for entry in fs.read_dir(&cwd).unwrap() {
        info!("{} {} bytes in {} blocks", entry.name, entry.size_in_bytes, entry.size_in_blocks);
    }
    info!("{} of {} blocks free", fs.disk().free_blocks(), fs.disk().num_blocks());
    fs.sync().unwrap();
}
