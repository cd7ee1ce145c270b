use chainfs::{BlockStorage, ChainFs, DirectoryHandle, FsError, Result};

const HELP: &str = "\
format               erase the volume
ls                   list the current directory
cd <dir>             change directory (.., / and . are understood)
mkdir <dir>          create a directory
touch <file>         create an empty file
cat <file>           print a file
write <file> <text>  append a line of text, creating the file
rm <name>            remove a file or an empty directory
stat <name>          show an entry and the blocks it occupies
df                   show free space
help                 show this text
exit                 leave the shell
";

/// What the caller should do after a command ran.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// Print the output and read the next command.
    Continue(String),
    Exit,
}

/// Line oriented front end: owns the volume and the current directory.
pub struct Shell<T: BlockStorage> {
    fs: ChainFs<T>,
    cwd: DirectoryHandle,
}

impl<T: BlockStorage> Shell<T> {
    /// Starts in the root directory, formatting the volume if it has none.
    pub fn new(mut fs: ChainFs<T>) -> Result<Self> {
        let cwd = fs.init()?;
        Ok(Shell { fs, cwd })
    }

    pub fn prompt(&self) -> String {
        format!("{}> ", self.cwd.name())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.fs.sync()
    }

    /// Runs one command line.
    pub fn execute(&mut self, line: &str) -> Result<Outcome> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let output = match words.as_slice() {
            [] => String::new(),
            ["format"] => {
                self.fs.format()?;
                self.cwd = self.fs.init()?;
                String::new()
            }
            ["ls"] => self.ls()?,
            ["cd", dir] => {
                self.fs.change_dir(&mut self.cwd, dir)?;
                String::new()
            }
            ["mkdir", dir] => {
                self.fs.make_dir(&mut self.cwd, dir)?;
                String::new()
            }
            ["touch", file] => {
                match self.fs.create_file(&mut self.cwd, file) {
                    Ok(()) | Err(FsError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e),
                }
                String::new()
            }
            ["cat", file] => self.cat(file)?,
            ["write", file, text @ ..] if !text.is_empty() => {
                self.append(file, &text.join(" "))?;
                String::new()
            }
            ["rm", name] => {
                self.fs.remove(&mut self.cwd, name)?;
                String::new()
            }
            ["stat", name] => self.stat(name)?,
            ["df"] => format!(
                "{} of {} blocks free\n",
                self.fs.disk().free_blocks(),
                self.fs.disk().num_blocks()
            ),
            ["help"] => HELP.to_string(),
            ["exit"] | ["quit"] => return Ok(Outcome::Exit),
            _ => {
                return Err(FsError::InvalidArgument(format!(
                    "unrecognized command \"{}\", try help",
                    line.trim()
                )))
            }
        };
        Ok(Outcome::Continue(output))
    }

    fn ls(&mut self) -> Result<String> {
        let mut out = String::new();
        for entry in self.fs.read_dir(&self.cwd)? {
            let suffix = if entry.is_dir { "/" } else { "" };
            out.push_str(&format!("{:>8} {}{}\n", entry.size_in_bytes, entry.name, suffix));
        }
        Ok(out)
    }

    fn cat(&mut self, name: &str) -> Result<String> {
        let mut fh = self.fs.open_file(&self.cwd, name)?;
        let mut buf = vec![0; fh.size()];
        let n = self.fs.read(&mut fh, &mut buf)?;
        self.fs.close_file(fh);
        buf.truncate(n);
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn append(&mut self, name: &str, text: &str) -> Result<()> {
        if self.fs.exists(&self.cwd, name)?.is_none() {
            self.fs.create_file(&mut self.cwd, name)?;
        }
        let mut fh = self.fs.open_file(&self.cwd, name)?;
        let end = fh.size();
        self.fs.seek(&mut fh, end)?;
        self.fs.write(&mut fh, text.as_bytes())?;
        self.fs.write(&mut fh, b"\n")?;
        self.fs.close_file(fh);
        Ok(())
    }

    fn stat(&mut self, name: &str) -> Result<String> {
        let entry = self.fs.stat(&self.cwd, name)?;
        let chain = self.fs.chain(entry.block)?;
        let blocks: Vec<String> = chain.iter().map(|b| b.to_string()).collect();
        Ok(format!(
            "name:   {}\ntype:   {}\nsize:   {} bytes\nblocks: {} [{}]\n",
            entry.name,
            if entry.is_dir { "directory" } else { "file" },
            entry.size_in_bytes,
            entry.size_in_blocks,
            blocks.join(" ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainfs::FileBlockEmulator;

    fn create_test_shell(blocks: usize) -> (tempfile::NamedTempFile, Shell<FileBlockEmulator>) {
        let disk = tempfile::NamedTempFile::new().unwrap();
        let fs = ChainFs::open_or_create(disk.path(), blocks).unwrap();
        (disk, Shell::new(fs).unwrap())
    }

    fn run(shell: &mut Shell<FileBlockEmulator>, line: &str) -> String {
        match shell.execute(line).unwrap() {
            Outcome::Continue(output) => output,
            Outcome::Exit => panic!("\"{}\" ended the session", line),
        }
    }

    #[test]
    fn write_appends_lines() {
        let (_disk, mut shell) = create_test_shell(64);
        run(&mut shell, "write notes.txt hello   world");
        run(&mut shell, "write notes.txt again");

        assert_eq!(run(&mut shell, "cat notes.txt"), "hello world\nagain\n");
    }

    #[test]
    fn ls_marks_directories() {
        let (_disk, mut shell) = create_test_shell(64);
        run(&mut shell, "mkdir src");
        run(&mut shell, "touch a");
        run(&mut shell, "touch a");

        assert_eq!(run(&mut shell, "ls"), "     512 src/\n       0 a\n");
    }

    #[test]
    fn cd_changes_the_prompt() {
        let (_disk, mut shell) = create_test_shell(64);
        assert_eq!(shell.prompt(), "/> ");
        run(&mut shell, "mkdir docs");
        run(&mut shell, "cd docs");
        assert_eq!(shell.prompt(), "docs> ");
        assert_eq!(run(&mut shell, "ls"), "");
        run(&mut shell, "cd ..");
        assert_eq!(shell.prompt(), "/> ");
    }

    #[test]
    fn stat_lists_the_chain() {
        let (_disk, mut shell) = create_test_shell(64);
        let text = "x".repeat(400);
        run(&mut shell, &format!("write big {}", text));

        let out = run(&mut shell, "stat big");
        assert!(out.contains("type:   file"));
        assert!(out.contains("size:   401 bytes"));
        assert!(out.contains("blocks: 2 [1 2]"));
    }

    #[test]
    fn stat_describes_directories() {
        let (_disk, mut shell) = create_test_shell(16);
        run(&mut shell, "mkdir d");

        assert_eq!(
            run(&mut shell, "stat d"),
            "name:   d\ntype:   directory\nsize:   512 bytes\nblocks: 1 [1]\n"
        );
    }

    #[test]
    fn listed_long_names_can_be_removed() {
        let (_disk, mut shell) = create_test_shell(16);
        run(&mut shell, &format!("touch {}é", "a".repeat(127)));
        let listed = run(&mut shell, "ls");
        let name = listed.split_whitespace().nth(1).unwrap().to_string();
        assert_eq!(name, "a".repeat(127));

        run(&mut shell, &format!("rm {}", name));
        assert_eq!(run(&mut shell, "ls"), "");
    }

    #[test]
    fn rm_and_df_track_space() {
        let (_disk, mut shell) = create_test_shell(16);
        assert_eq!(run(&mut shell, "df"), "15 of 16 blocks free\n");
        run(&mut shell, "touch a");
        assert_eq!(run(&mut shell, "df"), "14 of 16 blocks free\n");
        run(&mut shell, "rm a");
        assert_eq!(run(&mut shell, "df"), "15 of 16 blocks free\n");
        assert!(matches!(shell.execute("rm a"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn format_returns_to_an_empty_root() {
        let (_disk, mut shell) = create_test_shell(16);
        run(&mut shell, "mkdir d");
        run(&mut shell, "cd d");
        run(&mut shell, "format");
        assert_eq!(shell.prompt(), "/> ");
        assert_eq!(run(&mut shell, "ls"), "");
    }

    #[test]
    fn bad_input_is_reported() {
        let (_disk, mut shell) = create_test_shell(16);
        assert!(matches!(shell.execute("frobnicate"), Err(FsError::InvalidArgument(_))));
        assert!(matches!(shell.execute("cd"), Err(FsError::InvalidArgument(_))));
        assert!(matches!(shell.execute("write f"), Err(FsError::InvalidArgument(_))));
        assert!(matches!(shell.execute("cat missing"), Err(FsError::NotFound(_))));
        assert_eq!(run(&mut shell, "   "), "");
        assert_eq!(shell.execute("exit").unwrap(), Outcome::Exit);
    }
}
