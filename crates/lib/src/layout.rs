//! Image-layout collaborator.
//!
//! Every partition of the final image gets a working folder
//! `Image_partitions/Pat_<id>_<type>`. The pipeline only writes into folders
//! created here; turning them into a disk image is left to an external
//! assembler command.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::IMAGE_FOLDER_NAME;
use crate::context::StagingDirs;
use crate::error::BuildError;
use crate::shell::{CommandShell, ShellSession, quote};

#[derive(Debug, Error)]
pub enum LayoutError {
  #[error(
    "existing folder {} does not match the partition table (unexpected entry '{entry}'); delete or rename it",
    root.display()
  )]
  Incompatible { root: PathBuf, entry: String },

  #[error("the partition table has no {0} partition")]
  MissingPartition(TypeTag),

  #[error("failed to access {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("no image assembler configured; set [image] assembler in the configuration")]
  NoAssembler,

  #[error("assembler did not produce {}", .0.display())]
  ImageMissing(PathBuf),

  #[error("failed to run the image assembler: {0}")]
  Assemble(#[source] Box<BuildError>),
}

/// Role a partition plays for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TypeTag {
  /// Unformatted area holding the bootloader.
  Raw,
  /// Boot partition with kernel, boot script and FPGA configuration.
  Fat,
  /// Linux root file system.
  Ext,
}

impl fmt::Display for TypeTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TypeTag::Raw => "RAW",
      TypeTag::Fat => "FAT",
      TypeTag::Ext => "EXT",
    };
    f.write_str(s)
  }
}

/// One partition of the final image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
  pub id: u32,
  /// File system type: `vfat`, `ext2`..`ext4`, `raw`, ...
  #[serde(rename = "type")]
  pub fs_type: String,
  /// Size such as `500M`, or `*` for "contents plus offset".
  #[serde(default = "dynamic_size")]
  pub size: String,
  #[serde(default)]
  pub offset: String,
}

fn dynamic_size() -> String {
  "*".to_string()
}

impl Partition {
  pub fn new(id: u32, fs_type: &str, size: &str, offset: &str) -> Self {
    Self {
      id,
      fs_type: fs_type.to_string(),
      size: size.to_string(),
      offset: offset.to_string(),
    }
  }

  pub fn tag(&self) -> Option<TypeTag> {
    match self.fs_type.to_ascii_lowercase().as_str() {
      "raw" | "none" => Some(TypeTag::Raw),
      "vfat" | "fat" => Some(TypeTag::Fat),
      "ext2" | "ext3" | "ext4" | "linux" => Some(TypeTag::Ext),
      _ => None,
    }
  }

  pub fn folder_name(&self) -> String {
    format!("Pat_{}_{}", self.id, self.fs_type.to_ascii_lowercase())
  }

  /// `id:type:size:offset`, the form handed to the assembler.
  pub fn spec(&self) -> String {
    format!("{}:{}:{}:{}", self.id, self.fs_type, self.size, self.offset)
  }
}

/// Boot partition, root file system, and the raw bootloader area.
pub fn default_partitions() -> Vec<Partition> {
  vec![
    Partition::new(1, "vfat", "*", "500M"),
    Partition::new(2, "ext3", "*", "1M"),
    Partition::new(3, "RAW", "*", "20M"),
  ]
}

/// `SocfpgaLinux<YYYYMMDD_HHMM>.img`
pub fn image_file_name(now: DateTime<Local>) -> String {
  format!("SocfpgaLinux{}.img", now.format("%Y%m%d_%H%M"))
}

/// Contract of the component that owns the partition folders and the image.
pub trait ImageLayout {
  /// Create (or validate) the working folder of every partition.
  fn stage_directories(&self) -> Result<BTreeMap<TypeTag, PathBuf>, LayoutError>;

  /// Turn the populated folders into `output_name` and return its path.
  fn assemble<S: CommandShell>(
    &self,
    shell: &S,
    output_name: &str,
  ) -> impl Future<Output = Result<PathBuf, LayoutError>>;
}

/// Partition folders under `<working_dir>/Image_partitions`.
#[derive(Debug, Clone)]
pub struct PartitionFolders {
  pub working_dir: PathBuf,
  pub partitions: Vec<Partition>,
  /// External command that writes the image.
  pub assembler: Option<String>,
}

impl PartitionFolders {
  pub fn new(working_dir: impl Into<PathBuf>, partitions: Vec<Partition>) -> Self {
    Self {
      working_dir: working_dir.into(),
      partitions,
      assembler: None,
    }
  }

  pub fn with_assembler(mut self, assembler: impl Into<String>) -> Self {
    self.assembler = Some(assembler.into());
    self
  }

  pub fn root(&self) -> PathBuf {
    self.working_dir.join(IMAGE_FOLDER_NAME)
  }

  /// RAW, FAT and EXT folders; all three are required.
  pub fn staging_dirs(&self) -> Result<StagingDirs, LayoutError> {
    let mut dirs = self.stage_directories()?;
    let mut take = |tag: TypeTag| dirs.remove(&tag).ok_or(LayoutError::MissingPartition(tag));
    Ok(StagingDirs {
      raw: take(TypeTag::Raw)?,
      fat: take(TypeTag::Fat)?,
      ext: take(TypeTag::Ext)?,
    })
  }

  fn check_compatible(&self, root: &Path) -> Result<(), LayoutError> {
    let entries = match fs::read_dir(root) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
      Err(e) => {
        return Err(LayoutError::Io {
          path: root.to_path_buf(),
          source: e,
        });
      }
    };

    let expected: Vec<String> = self.partitions.iter().map(Partition::folder_name).collect();
    for entry in entries {
      let entry = entry.map_err(|e| LayoutError::Io {
        path: root.to_path_buf(),
        source: e,
      })?;
      let name = entry.file_name().to_string_lossy().into_owned();
      if !expected.contains(&name) {
        return Err(LayoutError::Incompatible {
          root: root.to_path_buf(),
          entry: name,
        });
      }
    }
    Ok(())
  }
}

impl ImageLayout for PartitionFolders {
  fn stage_directories(&self) -> Result<BTreeMap<TypeTag, PathBuf>, LayoutError> {
    let root = self.root();
    self.check_compatible(&root)?;

    let mut dirs = BTreeMap::new();
    for partition in &self.partitions {
      let dir = root.join(partition.folder_name());
      fs::create_dir_all(&dir).map_err(|e| LayoutError::Io {
        path: dir.clone(),
        source: e,
      })?;
      debug!(id = partition.id, dir = %dir.display(), "partition folder ready");
      if let Some(tag) = partition.tag() {
        dirs.entry(tag).or_insert(dir);
      }
    }
    Ok(dirs)
  }

  async fn assemble<S: CommandShell>(&self, shell: &S, output_name: &str) -> Result<PathBuf, LayoutError> {
    let assembler = self.assembler.as_deref().ok_or(LayoutError::NoAssembler)?;
    let specs: Vec<String> = self.partitions.iter().map(|p| quote(&p.spec())).collect();
    let session = ShellSession::new(&self.working_dir).command(format!(
      "{} {} {} {}",
      assembler,
      quote(output_name),
      quote(IMAGE_FOLDER_NAME),
      specs.join(" ")
    ));

    info!(image = output_name, "assembling disk image");
    shell
      .run(&session)
      .await
      .map_err(|e| LayoutError::Assemble(Box::new(e)))?;

    let image = self.working_dir.join(output_name);
    if !image.is_file() {
      return Err(LayoutError::ImageMissing(image));
    }
    info!(image = %image.display(), "disk image ready");
    Ok(image)
  }
}
