/*!
Control the appearance of simulation result data

# Examples

Creating a [`ResultsTable`] after running a simulation:

```
use propagation_sim::prelude::*;

let mut sim = SimulationBuilder::new()
    .add_node("a", Region::Europe, 0.6)
    .add_node("b", Region::Asia, 0.4)
    .fully_connected()
    .difficulty(0.05)
    .seed(11)
    .build()
    .unwrap();

sim.run(1_000);

let results = ResultsBuilder::new(&sim)
    .all()                // Include every per-node metric
    .format(Format::CSV)  // Output results as CSV
    .build();

println!("{}", results);
```
*/

use std::{collections::BTreeSet, fmt::Display};

use crate::{
    block::BlockId,
    node::{Node, NodeId},
    simulation::Simulation,
};

/// Floating point precision of results data.
pub const FLOAT_PRECISION_DIGITS: usize = 6;

/// Builder for [`ResultsTable`].
#[derive(Debug, Clone)]
pub struct ResultsBuilder<'a> {
    columns: BTreeSet<Column>,
    format: Format,
    sim: &'a Simulation,
}

/// Describes the appearance of a [`ResultsTable`] table as given by its
/// [`Display`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Comma-separated, without extra whitespace.
    CSV,
    /// Human-readable.
    #[default]
    PrettyPrint,
}

impl<'a> ResultsBuilder<'a> {
    /// Create a new [`ResultsBuilder`] over the current state of `sim`.
    pub fn new(sim: &'a Simulation) -> Self {
        Self { sim, columns: BTreeSet::default(), format: Format::default() }
    }

    /// Include every available column.
    pub fn all(self) -> Self {
        self.blocks_mined()
            .revenue()
            .best_height()
            .heads()
            .stale_blocks()
            .mempool_size()
            .propagation_delay()
            .block_interval()
    }

    /// Include the "Blocks Mined" column.
    pub fn blocks_mined(mut self) -> Self {
        self.columns.insert(Column::BlocksMined);

        self
    }

    /// Include the "Revenue" column: the share of blocks on the longest best
    /// chain of any node which were mined by each node.
    pub fn revenue(mut self) -> Self {
        self.columns.insert(Column::Revenue);

        self
    }

    /// Include the "Best Height" column.
    pub fn best_height(mut self) -> Self {
        self.columns.insert(Column::BestHeight);

        self
    }

    /// Include the "Heads" column, the number of chain tips each node holds.
    pub fn heads(mut self) -> Self {
        self.columns.insert(Column::Heads);

        self
    }

    /// Include the "Stale Blocks" column.
    pub fn stale_blocks(mut self) -> Self {
        self.columns.insert(Column::StaleBlocks);

        self
    }

    /// Include the "Mempool Size" column.
    pub fn mempool_size(mut self) -> Self {
        self.columns.insert(Column::MempoolSize);

        self
    }

    /// Include the "Mean Propagation Delay" column: the mean number of ticks
    /// between the creation of a block by another node and its receipt.
    pub fn propagation_delay(mut self) -> Self {
        self.columns.insert(Column::PropagationDelay);

        self
    }

    /// Include the "Mean Block Interval" column.
    pub fn block_interval(mut self) -> Self {
        self.columns.insert(Column::BlockInterval);

        self
    }

    /// Specify the [`Format`] of the results table.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;

        self
    }

    /// Create new [`ResultsTable`].
    pub fn build(self) -> ResultsTable {
        let ResultsBuilder { mut columns, format, sim } = self;

        columns.insert(Column::Node);
        columns.insert(Column::Region);
        columns.insert(Column::Power);

        let reference = reference_chain(sim);
        let columns = Vec::from_iter(columns);
        let rows = sim
            .nodes()
            .iter()
            .map(|node| {
                columns
                    .iter()
                    .map(|col| col.get_value(node, &reference))
                    .collect()
            })
            .collect();

        ResultsTable { columns, format, rows }
    }
}

/// Per-node results of a [`Simulation`]. The results table is given by the
/// struct's [`Display`] implementation, as specified by its [`Format`].
pub struct ResultsTable {
    columns: Vec<Column>,
    format: Format,
    rows: Vec<Vec<ColumnValue>>,
}

impl ResultsTable {
    const SEPARATOR_VERTICAL: char = '|';
    const SEPARATOR_HORIZONTAL: char = '-';

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    /// Number of data rows, one per node.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Display for ResultsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let titles: Vec<_> =
            self.columns.iter().map(|col_type| col_type.to_string()).collect();

        match self.format {
            Format::CSV => {
                write!(f, "{}", titles.join(","))?;

                for row in self.rows.iter() {
                    writeln!(f)?;

                    let row: Vec<_> =
                        row.iter().map(|val| val.to_string()).collect();

                    write!(f, "{}", row.join(","))?;
                }
            }
            Format::PrettyPrint => {
                let mut text_widths: Vec<_> =
                    titles.iter().map(|title| title.len()).collect();

                for row in self.rows.iter() {
                    for (i, val) in row.iter().enumerate() {
                        let val = val.to_string();
                        text_widths[i] = text_widths[i].max(val.len());
                    }
                }

                for (i, title) in titles.into_iter().enumerate() {
                    write!(
                        f,
                        " {:1$} {2}",
                        title,
                        text_widths[i],
                        Self::SEPARATOR_VERTICAL
                    )?;
                }
                writeln!(f)?;

                let total_width = text_widths.iter().map(|x| x + 3).sum();
                for _ in 0..total_width {
                    write!(f, "{}", Self::SEPARATOR_HORIZONTAL)?;
                }

                for row in self.rows.iter() {
                    writeln!(f)?;

                    for (i, val) in row.iter().enumerate() {
                        write!(
                            f,
                            " {:1$} {2}",
                            val.to_string(),
                            text_widths[i],
                            Self::SEPARATOR_VERTICAL
                        )?;
                    }
                }
            }
        }

        Ok(())
    }
}

/// Type of column that can appear in a results table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Column {
    // Variant order determines the order of columns in results tables:
    // https://doc.rust-lang.org/stable/std/cmp/trait.PartialOrd.html#derivable
    Node,
    Region,
    Power,
    BlocksMined,
    Revenue,
    BestHeight,
    Heads,
    StaleBlocks,
    MempoolSize,
    PropagationDelay,
    BlockInterval,
}

/// Value which corresponds to a [`Column`].
#[derive(Debug, Clone)]
enum ColumnValue {
    Text(String),
    Count(u64),
    Float(f64),
    Missing,
}

/// The best chain of the node whose best head is highest. Ties go to the
/// node with the lowest ID.
fn reference_chain(sim: &Simulation) -> Vec<BlockId> {
    let mut best: Option<&Node> = None;
    for node in sim.nodes() {
        match best {
            Some(b) if b.ledger().height() >= node.ledger().height() => (),
            _ => best = Some(node),
        }
    }

    best.map(|node| node.ledger().best_chain()).unwrap_or_default()
}

#[inline]
fn revenue_of(miner: NodeId, chain: &[BlockId]) -> f64 {
    // Genesis is not mined by anyone.
    let mined = chain.len().saturating_sub(1);
    if mined == 0 {
        return 0.0;
    }

    let blocks = chain.iter().skip(1).filter(|id| id.miner == miner).count();
    blocks as f64 / mined as f64
}

/// Mean ticks between the creation of a block by another node and its first
/// receipt by `node`.
fn propagation_delay_of(node: &Node) -> Option<f64> {
    let delays: Vec<_> = node
        .stats()
        .blocks
        .iter()
        .filter(|(id, _)| id.miner != node.id())
        .filter_map(|(&id, &received)| {
            let block = node.ledger().get(id)?;
            Some(received.saturating_sub(block.created_at) as f64)
        })
        .collect();

    if delays.is_empty() {
        None
    } else {
        Some(delays.iter().sum::<f64>() / delays.len() as f64)
    }
}

impl Column {
    fn get_value(&self, node: &Node, reference: &[BlockId]) -> ColumnValue {
        use ColumnValue::*;

        match &self {
            Self::Node => Text(node.name().to_string()),
            Self::Region => Text(node.region().to_string()),
            Self::Power => Float(node.power()),
            Self::BlocksMined => Count(node.blocks_mined()),
            Self::Revenue => Float(revenue_of(node.id(), reference)),
            Self::BestHeight => Count(node.ledger().height()),
            Self::Heads => Count(node.ledger().heads().len() as u64),
            Self::StaleBlocks => Count(node.ledger().stale_blocks() as u64),
            Self::MempoolSize => Count(node.mempool().len() as u64),
            Self::PropagationDelay => {
                propagation_delay_of(node).map(Float).unwrap_or(Missing)
            }
            Self::BlockInterval => node
                .ledger()
                .average_block_interval()
                .map(Float)
                .unwrap_or(Missing),
        }
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let title = match &self {
            Self::Node => "Node",
            Self::Region => "Region",
            Self::Power => "Power",
            Self::BlocksMined => "Blocks Mined",
            Self::Revenue => "Revenue",
            Self::BestHeight => "Best Height",
            Self::Heads => "Heads",
            Self::StaleBlocks => "Stale Blocks",
            Self::MempoolSize => "Mempool Size",
            Self::PropagationDelay => "Mean Propagation Delay",
            Self::BlockInterval => "Mean Block Interval",
        };

        write!(f, "{}", title)
    }
}

impl Display for ColumnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::Text(text) => write!(f, "{}", text),
            Self::Count(num) => write!(f, "{}", num),
            Self::Float(value) => {
                write!(f, "{:.1$}", value, FLOAT_PRECISION_DIGITS)
            }
            Self::Missing => write!(f, "-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{revenue_of, Format, ResultsBuilder};
    use crate::{
        block::BlockId, network::Region, simulation::SimulationBuilder,
    };

    #[test]
    fn revenue_ignores_genesis() {
        let chain = [
            BlockId::GENESIS,
            BlockId::new(1.into(), 1),
            BlockId::new(2.into(), 1),
            BlockId::new(1.into(), 2),
            BlockId::new(1.into(), 3),
        ];

        assert_eq!(revenue_of(1.into(), &chain), 0.75);
        assert_eq!(revenue_of(2.into(), &chain), 0.25);
        assert_eq!(revenue_of(1.into(), &chain[..1]), 0.0);
    }

    #[test]
    fn csv_has_header_and_row_per_node() {
        let sim = SimulationBuilder::new()
            .add_node("a", Region::Europe, 0.5)
            .add_node("b", Region::Asia, 0.5)
            .seed(0)
            .build()
            .unwrap();

        let table = ResultsBuilder::new(&sim)
            .blocks_mined()
            .format(Format::CSV)
            .build();
        let text = table.to_string();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(table.len(), 2);
        assert_eq!(lines[0], "Node,Region,Power,Blocks Mined");
        assert_eq!(lines[1], "a,europe,0.500000,0");
        assert_eq!(lines[2], "b,asia,0.500000,0");
    }
}
