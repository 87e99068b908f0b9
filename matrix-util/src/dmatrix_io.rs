use crate::common_io::{read_lines_of_words_delim, write_lines, Delimiter};
use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};

use std::fmt::Display;
use std::io::BufRead;
use std::str::FromStr;

impl<T> IoOps for DMatrix<T>
where
    T: nalgebra::Scalar + Send + FromStr + Display + Copy,
    <T as FromStr>::Err: Display,
{
    type Mat = Self;

    fn write_with_names(
        &self,
        file: &str,
        row_names: &[Box<str>],
        column_names: &[Box<str>],
        delim: &str,
    ) -> anyhow::Result<()> {
        if row_names.len() != self.nrows() || column_names.len() != self.ncols() {
            anyhow::bail!(
                "names ({} x {}) do not match the matrix ({} x {})",
                row_names.len(),
                column_names.len(),
                self.nrows(),
                self.ncols()
            );
        }

        let mut lines = Vec::with_capacity(self.nrows() + 1);
        let header = std::iter::once("#")
            .chain(column_names.iter().map(|x| x.as_ref()))
            .collect::<Vec<_>>()
            .join(delim);
        lines.push(header.into_boxed_str());

        for (name, row) in row_names.iter().zip(self.row_iter()) {
            let line = std::iter::once(name.to_string())
                .chain(row.iter().map(|x| format!("{}", *x)))
                .collect::<Vec<_>>()
                .join(delim);
            lines.push(line.into_boxed_str());
        }

        write_lines(&lines, file)
    }

    fn read_with_names(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let delim = delim.into();

        // the header starts with `#`, which the line reader treats as a
        // comment, so the header is taken from the raw first line
        let first = crate::common_io::open_buf_reader(file)?
            .lines()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty file {}", file))??;

        let cols: Vec<Box<str>> = delim
            .split(&first)
            .into_iter()
            .skip(1)
            .map(Box::from)
            .collect();

        let body = read_lines_of_words_delim(file, delim, -1)?.lines;

        let mut rows = Vec::with_capacity(body.len());
        let mut data = Vec::with_capacity(body.len() * cols.len());

        for (i, words) in body.into_iter().enumerate() {
            if words.len() != cols.len() + 1 {
                anyhow::bail!(
                    "{}: row {} has {} values, expected {}",
                    file,
                    i + 1,
                    words.len().saturating_sub(1),
                    cols.len()
                );
            }
            let mut words = words.into_iter();
            if let Some(name) = words.next() {
                rows.push(name);
            }
            for w in words {
                let x = w
                    .parse::<T>()
                    .map_err(|e| anyhow::anyhow!("{}: cannot parse `{}`: {}", file, w, e))?;
                data.push(x);
            }
        }

        let mat = DMatrix::<T>::from_row_iterator(rows.len(), cols.len(), data);
        Ok(MatWithNames { rows, cols, mat })
    }
}
