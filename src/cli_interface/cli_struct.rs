use clap::Parser;

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub enum FlatFsCli {
    /// create a new file system
    Mkfs(MkfsArgs),
    /// print usage statistics of a file system
    Stats(ImageArgs),
    /// list a directory
    Ls(PathArgs),
    /// create a directory
    Mkdir(PathArgs),
    /// create an empty file
    Touch(PathArgs),
    /// copy a local file into the file system
    Put(PutArgs),
    /// print a file to standard output
    Cat(PathArgs),
    /// remove a file or an empty directory
    Rm(PathArgs),
}

/// where the image lives and how big it is
#[derive(clap::Args, Debug, PartialEq)]
pub struct ImageArgs {
    /// the path of the file system image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the number of blocks of the image
    #[clap(short, long)]
    pub blocks: u32,
}

///make a new fs subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "make a new file system")]
pub struct MkfsArgs {
    #[command(flatten)]
    pub image: ImageArgs,
    /// the inode count of the file system, one per 4 blocks by default
    #[clap(short, long)]
    pub inode_count: Option<u32>,
}

/// subcommands working on one path inside the file system
#[derive(clap::Args, Debug, PartialEq)]
pub struct PathArgs {
    #[command(flatten)]
    pub image: ImageArgs,
    /// a path inside the file system, like `/dir/file`
    #[clap(default_value = "/")]
    pub path: String,
}

/// copy a local file in
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "copy a local file into the file system")]
pub struct PutArgs {
    #[command(flatten)]
    pub image: ImageArgs,
    /// the local file to copy
    #[clap(short, long)]
    pub source: String,
    /// the destination inside the file system, created when missing
    pub path: String,
}

/// test the `FlatFsCli` struct
/// test `mkfs` subcommand
#[cfg(test)]
mod mkfs_parse_args_tests {
    use super::*;
    /// test short parameter form
    #[test]
    fn test_short_parameter_form() {
        let args = FlatFsCli::parse_from(["flatfs", "mkfs", "-p", "test", "-b", "64", "-i", "16"]);
        assert_eq!(
            args,
            FlatFsCli::Mkfs(MkfsArgs {
                image: ImageArgs {
                    image_file_path: "test".to_string(),
                    blocks: 64,
                },
                inode_count: Some(16),
            })
        );
    }
    /// test long parameter form
    #[test]
    fn test_long_parameter_form() {
        let image_file_path_name = concat!("--", "image-file-path");
        let args = FlatFsCli::parse_from([
            "flatfs",
            "mkfs",
            image_file_path_name,
            "test",
            "--blocks",
            "1024",
        ]);
        assert_eq!(
            args,
            FlatFsCli::Mkfs(MkfsArgs {
                image: ImageArgs {
                    image_file_path: "test".to_string(),
                    blocks: 1024,
                },
                inode_count: None,
            })
        );
    }

    #[test]
    fn test_missing_blocks() {
        assert!(FlatFsCli::try_parse_from(["flatfs", "mkfs", "-p", "test"]).is_err());
    }
}
