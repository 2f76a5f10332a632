use crate::{
    bitstream::BitReader,
    error::{Error, Result},
};

use super::jpeg_reader::JPEGParser;

/// Longest code a baseline Huffman table may hold
pub const MAX_CODE_LENGTH: usize = 16;

/// Highest Huffman table id a DHT segment may define
pub const MAX_TABLE_ID: u8 = 3;

/// AC symbol that ends a block early
pub const END_OF_BLOCK: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanTableType {
    Dc,
    Ac,
}

impl HuffmanTableType {
    pub fn name(&self) -> &'static str {
        match self {
            HuffmanTableType::Dc => "DC Huffman",
            HuffmanTableType::Ac => "AC Huffman",
        }
    }
}

/// Node of a [`CodeTree`]. Children are indices into the tree's node list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Leaf(u8),
    Branch {
        left: Option<usize>,
        right: Option<usize>,
    },
}

impl Node {
    const EMPTY_BRANCH: Node = Node::Branch {
        left: None,
        right: None,
    };
}

/// Binary decoding tree of a canonical Huffman code. A 0 bit follows the left branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTree {
    nodes: Vec<Node>,
}

impl CodeTree {
    /// Builds the tree from the number of codes of each length (1 to 16 bits) and the symbols
    /// in code order.
    pub fn new(bitcode_counts: &[u8; MAX_CODE_LENGTH], symbols: &[u8]) -> Result<Self> {
        let total: usize = bitcode_counts.iter().map(|count| *count as usize).sum();
        if total != symbols.len() {
            return Err(Error::Malformed(
                "Huffman table symbol count doesn't match its code counts",
            ));
        }

        let mut tree = Self {
            nodes: vec![Node::EMPTY_BRANCH],
        };

        // Canonical assignment: each code is the leftmost free slot at its depth
        let mut code: u32 = 0;
        let mut symbol_cursor = 0;
        for (length_index, count) in bitcode_counts.iter().enumerate() {
            let length = length_index + 1;
            for _ in 0..*count {
                if code >> length != 0 {
                    return Err(Error::Malformed(
                        "Huffman table defines more codes than fit at their length",
                    ));
                }
                tree.insert(code, length, symbols[symbol_cursor])?;
                symbol_cursor += 1;
                code += 1;
            }
            code <<= 1;
        }

        Ok(tree)
    }

    fn insert(&mut self, code: u32, length: usize, symbol: u8) -> Result<()> {
        let mut current = 0;
        for depth in (0..length).rev() {
            let bit = (code >> depth) & 1;
            let last = depth == 0;

            let child = match self.nodes[current] {
                Node::Leaf(_) => {
                    return Err(Error::Malformed("Huffman code is prefixed by another code"))
                }
                Node::Branch { left, right } => {
                    if bit == 0 {
                        left
                    } else {
                        right
                    }
                }
            };

            current = match child {
                Some(_) if last => {
                    return Err(Error::Malformed("Huffman code slot is already taken"))
                }
                Some(index) => index,
                None => {
                    let index = self.nodes.len();
                    self.nodes.push(if last {
                        Node::Leaf(symbol)
                    } else {
                        Node::EMPTY_BRANCH
                    });
                    if let Node::Branch { left, right } = &mut self.nodes[current] {
                        if bit == 0 {
                            *left = Some(index);
                        } else {
                            *right = Some(index);
                        }
                    }
                    index
                }
            };
        }
        Ok(())
    }

    /// Reads bits until they spell out a complete code and returns its symbol.
    pub fn decode(&self, bitstream: &mut BitReader) -> Result<u8> {
        let mut current = 0;
        for _ in 0..MAX_CODE_LENGTH {
            let bit = bitstream.next_bit()?;
            let next = match self.nodes[current] {
                Node::Branch { left, right } => {
                    if bit == 0 {
                        left
                    } else {
                        right
                    }
                }
                Node::Leaf(_) => None,
            };

            current = match next {
                Some(index) => index,
                None => return Err(Error::Decode("Invalid Huffman code")),
            };
            if let Node::Leaf(symbol) = self.nodes[current] {
                return Ok(symbol);
            }
        }

        Err(Error::Decode(
            "Huffman code longer than the 16 bit maximum for baseline JPEGs",
        ))
    }

    #[cfg(test)]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

/// Defines a JPEG huffman table
#[derive(Debug, Clone)]
pub struct HuffmanTable {
    pub table_type: HuffmanTableType,
    pub destination_id: u8,
    pub tree: CodeTree,
}

impl HuffmanTable {
    /// Reads a single table definition from a DHT segment.
    pub fn read(reader: &mut JPEGParser) -> Result<Self> {
        let (table_class, destination_id) = reader.read_nibbles()?;
        let table_type = match table_class {
            0 => HuffmanTableType::Dc,
            1 => HuffmanTableType::Ac,
            _ => return Err(Error::Malformed("Invalid table type")),
        };
        if destination_id > MAX_TABLE_ID {
            return Err(Error::Malformed("Huffman table id out of range"));
        }

        let mut bitcode_counts = [0u8; MAX_CODE_LENGTH];
        for count in bitcode_counts.iter_mut() {
            *count = reader.read_next_byte()?;
        }

        let size: usize = bitcode_counts.iter().map(|count| *count as usize).sum();
        let mut symbols = vec![0u8; size];
        for symbol in symbols.iter_mut() {
            *symbol = reader.read_next_byte()?;
        }

        Ok(Self {
            table_type,
            destination_id,
            tree: CodeTree::new(&bitcode_counts, &symbols)?,
        })
    }

    pub fn decode(&self, bitstream: &mut BitReader) -> Result<u8> {
        self.tree.decode(bitstream)
    }
}
