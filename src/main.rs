use std::io::Write;

use anyhow::{anyhow, bail, Context};
use byte_unit::Byte;
use clap::Parser;
use flatfs::{
    cli_interface::{FlatFsCli, ImageArgs, PathArgs},
    mkfs::MkfsOptions,
    split_path, Backing, FileKind, FlatFs, FsError, FsResult, Stat, BLOCK_SIZE,
};
use log::info;

/// a CLI interface to create a file system image and work with the files in it
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    let args = FlatFsCli::parse();
    match args {
        FlatFsCli::Mkfs(args) => {
            let mut options = MkfsOptions::new(args.image.blocks);
            if let Some(inode_count) = args.inode_count {
                options = options.with_inode_count(inode_count);
            }
            let geometry = flatfs::mkfs::mkfs(&args.image.image_file_path, &options)?;
            let size = Byte::from_bytes(geometry.image_size() as u128).get_appropriate_unit(true);
            println!(
                "created {} ({size}): {} data blocks, {} inodes",
                args.image.image_file_path,
                geometry.data_blocks(),
                geometry.inode_count
            );
        }
        FlatFsCli::Stats(image) => open_image(&image)?.print_stats(),
        FlatFsCli::Ls(args) => ls(&args)?,
        FlatFsCli::Mkdir(args) => {
            open_image(&args.image)?.create(&split_path(&args.path), true)?;
        }
        FlatFsCli::Touch(args) => {
            open_image(&args.image)?.create(&split_path(&args.path), false)?;
        }
        FlatFsCli::Rm(args) => open_image(&args.image)?.unlink(&split_path(&args.path))?,
        FlatFsCli::Cat(args) => cat(&args)?,
        FlatFsCli::Put(args) => {
            let data = std::fs::read(&args.source)
                .with_context(|| format!("cannot read {}", args.source))?;
            let mut fs = open_image(&args.image)?;
            let wrote = copy_in(&mut fs, &split_path(&args.path), &data)?;
            info!("copied {wrote} bytes to {}", args.path);
        }
    }
    Ok(())
}

/// an image must be created by `mkfs` before anything else touches it
fn open_image(image: &ImageArgs) -> anyhow::Result<FlatFs> {
    if !std::path::Path::new(&image.image_file_path).exists() {
        return Err(anyhow!(
            "{} does not exist, create it with `mkfs` first",
            image.image_file_path
        ));
    }
    FlatFs::initialize(&image.image_file_path, image.blocks)
        .with_context(|| format!("cannot open {}", image.image_file_path))
}

fn ls(args: &PathArgs) -> anyhow::Result<()> {
    let mut fs = open_image(&args.image)?;
    for stat in list_dir(&mut fs, &split_path(&args.path))? {
        let kind = match stat.kind {
            FileKind::Directory => "d",
            FileKind::RegularFile => "-",
        };
        println!(
            "{kind} {:>6} {:>8} {}",
            stat.inode_number, stat.size, stat.name
        );
    }
    Ok(())
}

/// walk the children of a directory, re-opening every child to reach its sibling
fn list_dir<B: Backing>(fs: &mut FlatFs<B>, parent: &[String]) -> anyhow::Result<Vec<Stat>> {
    let dir = fs.open(parent)?;
    let first = fs.stat_child(dir);
    fs.close(dir)?;

    let mut children = Vec::new();
    let mut next = end_of_listing(first)?;
    while let Some(stat) = next {
        let mut path = parent.to_vec();
        path.push(stat.name.clone());
        let fd = fs.open(&path)?;
        let sibling = fs.stat_next(fd);
        fs.close(fd)?;
        next = end_of_listing(sibling)?;
        children.push(stat);
    }
    Ok(children)
}

/// `NotFound` ends a listing, anything else is a real failure
fn end_of_listing(result: FsResult<Stat>) -> anyhow::Result<Option<Stat>> {
    match result {
        Ok(stat) => Ok(Some(stat)),
        Err(FsError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// replace the file at `path` with `data`
fn copy_in<B: Backing>(fs: &mut FlatFs<B>, path: &[String], data: &[u8]) -> anyhow::Result<usize> {
    match fs.stat(path) {
        Ok(stat) if stat.kind == FileKind::Directory => {
            bail!("/{} is a directory", path.join("/"))
        }
        // old contents must not survive past the end of the new ones
        Ok(_) => fs.unlink(path)?,
        Err(FsError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    fs.create(path, false)?;
    let fd = fs.open(path)?;
    let mut wrote = 0;
    while wrote < data.len() {
        match fs.write(fd, &data[wrote..]) {
            Ok(n) => wrote += n,
            Err(e) => {
                fs.close(fd)?;
                bail!("{} of {} bytes copied: {e}", wrote, data.len());
            }
        }
    }
    fs.close(fd)?;
    Ok(wrote)
}

fn cat(args: &PathArgs) -> anyhow::Result<()> {
    let mut fs = open_image(&args.image)?;
    let fd = fs.open(&split_path(&args.path))?;
    let mut stdout = std::io::stdout().lock();
    let mut buf = vec![0u8; 8 * BLOCK_SIZE as usize];
    loop {
        let read = fs.read(fd, &mut buf)?;
        if read == 0 {
            break;
        }
        stdout.write_all(&buf[..read])?;
    }
    fs.close(fd)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(children: &[Stat]) -> Vec<&str> {
        children.iter().map(|stat| stat.name.as_str()).collect()
    }

    #[test]
    fn test_list_dir() {
        let mut fs = FlatFs::in_memory(&MkfsOptions::new(64)).unwrap();
        assert!(list_dir(&mut fs, &[]).unwrap().is_empty());
        fs.create(&["A"], false).unwrap();
        fs.create(&["B"], true).unwrap();
        fs.create(&["B", "C"], false).unwrap();
        assert_eq!(names(&list_dir(&mut fs, &[]).unwrap()), ["B", "A"]);
        assert_eq!(names(&list_dir(&mut fs, &split_path("/B")).unwrap()), ["C"]);
        assert!(list_dir(&mut fs, &split_path("/A")).is_err());
    }

    #[test]
    fn test_list_dir_reports_a_damaged_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("disk.img");
        let (block, offset) = {
            let mut fs = FlatFs::initialize(&image, 64).unwrap();
            let older = fs.create(&["A"], false).unwrap();
            fs.create(&["B"], false).unwrap();
            fs.geometry().inode_position(older.inode_number)
        };
        // flip one byte of the name of `A` (past id, kind and name length),
        // its digest no longer matches
        let mut raw = std::fs::read(&image).unwrap();
        let at = block as usize * BLOCK_SIZE as usize + offset + 16;
        raw[at] ^= 0x20;
        std::fs::write(&image, raw).unwrap();

        let mut fs = FlatFs::initialize(&image, 64).unwrap();
        let err = list_dir(&mut fs, &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FsError>(),
            Some(FsError::Corrupted(_))
        ));
    }

    #[test]
    fn test_copy_in_replaces_old_contents() {
        let mut fs = FlatFs::in_memory(&MkfsOptions::new(64)).unwrap();
        let path = split_path("/notes");
        assert_eq!(copy_in(&mut fs, &path, &[b'x'; 1000]).unwrap(), 1000);
        assert_eq!(copy_in(&mut fs, &path, b"short").unwrap(), 5);
        assert_eq!(fs.stat(&path).unwrap().size, 5);

        let fd = fs.open(&path).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"short");
        // the blocks of the longer version were given back
        assert_eq!(fs.stats().blocks_free, 52);
    }

    #[test]
    fn test_copy_in_refuses_a_directory() {
        let mut fs = FlatFs::in_memory(&MkfsOptions::new(64)).unwrap();
        fs.create(&["d"], true).unwrap();
        assert!(copy_in(&mut fs, &split_path("/d"), b"data").is_err());
        assert_eq!(fs.stat(&["d"]).unwrap().kind, FileKind::Directory);
    }
}
