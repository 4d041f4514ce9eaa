use crate::globus::transfer::TransferItem;
use chrono::{Datelike, NaiveDate};
use std::fmt::{self, Display};

pub(crate) const MIRROR_ROOT: &str = "/chroot/sddata";

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum DataType {
    Raw,
    Dat,
    Fit,
    #[value(name = "fitacf25")]
    Fitacf25,
    #[value(name = "fitacf30")]
    Fitacf30,
    Map,
    Grid,
    Summary,
}

impl DataType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Dat => "dat",
            Self::Fit => "fit",
            Self::Fitacf25 => "fitacf25",
            Self::Fitacf30 => "fitacf30",
            Self::Map => "map",
            Self::Grid => "grid",
            Self::Summary => "summary",
        }
    }

    // what the file names of each type end with on the mirror
    fn suffix(self) -> &'static str {
        match self {
            Self::Raw => "rawacf.bz2",
            Self::Dat => "dat.bz2",
            Self::Fit | Self::Fitacf25 | Self::Fitacf30 => "fitacf.gz",
            Self::Map => "map",
            Self::Grid => "grid",
            Self::Summary => "",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub(crate) enum InvalidRequest {
    #[error("Sync year \"{0}\" is in the future.")]
    FutureYear(i32),
    #[error("Sync month \"{0:02}\" is in the future.")]
    FutureMonth(u32),
    #[error("Sync month \"{0:02}\" invalid.")]
    InvalidMonth(u32),
    #[error("Sync local dir is empty.")]
    EmptyLocalDir,
}

/// One month of one data type on the mirror, narrowed down by a file name pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SyncRequest {
    pub(crate) year: i32,
    pub(crate) month: u32,
    pub(crate) pattern: String,
    pub(crate) data_type: DataType,
    pub(crate) local_dir: String,
}

impl SyncRequest {
    /// The destination directory lives on the destination endpoint, which may be
    /// another machine, so it is not checked for existence here.
    pub(crate) fn validate(&self, today: NaiveDate) -> Result<(), InvalidRequest> {
        if !(1..=12).contains(&self.month) {
            return Err(InvalidRequest::InvalidMonth(self.month));
        }
        if self.year > today.year() {
            return Err(InvalidRequest::FutureYear(self.year));
        }
        if self.year == today.year() && self.month > today.month() {
            return Err(InvalidRequest::FutureMonth(self.month));
        }
        if self.local_dir.is_empty() {
            return Err(InvalidRequest::EmptyLocalDir);
        }
        Ok(())
    }

    pub(crate) fn listing_path(&self, root: &str) -> String {
        format!(
            "{}/{}/{}/{:02}/",
            root.trim_end_matches('/'),
            self.data_type,
            self.year,
            self.month,
        )
    }

    pub(crate) fn listing_filter(&self) -> String {
        format!("name:~*{}*{}", self.pattern, self.data_type.suffix())
    }

    pub(crate) fn items<'a, I>(&self, root: &str, names: I) -> Vec<TransferItem>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let source = self.listing_path(root);
        let destination = self.local_dir.trim_end_matches('/');
        names
            .into_iter()
            .map(|name| {
                TransferItem::new(format!("{source}{name}"), format!("{destination}/{name}"))
            })
            .collect()
    }
}
