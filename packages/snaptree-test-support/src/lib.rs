//! Shared fixtures for snaptree conformance tests: a price-history record, a record that owns a
//! container, and the reset-then-edit scenarios every state shape must survive.

use std::any::Any;

use snaptree_core::{Draft, Error, Kind, Patch, Path, PathSeg, Record, Result, Value};

/// A listed instrument. `price` is derived from the history and is not a structural member.
#[derive(Clone, Debug, PartialEq)]
pub struct Stock {
    pub ticker: String,
    pub name: String,
    pub price_history: Vec<f64>,
}

impl Stock {
    pub fn new(ticker: &str, name: &str, price_history: Vec<f64>) -> Self {
        Self {
            ticker: ticker.to_string(),
            name: name.to_string(),
            price_history,
        }
    }

    pub fn price(&self) -> f64 {
        self.price_history.last().copied().unwrap_or(0.0)
    }

    pub fn push_price(&mut self, price: f64) -> &mut Self {
        self.price_history.push(price);
        self
    }
}

fn expect_str(field: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::TypeMismatch(format!("`{field}` must be a string")))
}

impl Record for Stock {
    fn type_name(&self) -> &'static str {
        "Stock"
    }

    fn fields(&self) -> &'static [&'static str] {
        &["ticker", "name", "price_history"]
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "ticker" => Some(Value::from(self.ticker.as_str())),
            "name" => Some(Value::from(self.name.as_str())),
            "price_history" => Some(Value::seq(self.price_history.iter().copied())),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "ticker" => self.ticker = expect_str(field, &value)?,
            "name" => self.name = expect_str(field, &value)?,
            "price_history" => {
                let items = value.as_seq().ok_or_else(|| {
                    Error::TypeMismatch("`price_history` must be a sequence".into())
                })?;
                self.price_history = items
                    .iter()
                    .map(|v| {
                        v.as_float().ok_or_else(|| {
                            Error::TypeMismatch("prices must be numbers".into())
                        })
                    })
                    .collect::<Result<_>>()?;
            }
            other => return Err(Error::MissingKey(format!("Stock has no field `{other}`"))),
        }
        Ok(())
    }

    fn clone_record(&self) -> Box<dyn Record> {
        Box::new(self.clone())
    }

    // Owns only plain data.
    fn freeze_members(&mut self, _: &mut snaptree_core::Freezer) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A record whose `holdings` member is itself a tree node, shared on clone.
#[derive(Clone, Debug)]
pub struct Portfolio {
    pub owner: String,
    pub holdings: Value,
}

impl Portfolio {
    pub fn new(owner: &str, holdings: Value) -> Self {
        Self {
            owner: owner.to_string(),
            holdings,
        }
    }
}

impl Record for Portfolio {
    fn type_name(&self) -> &'static str {
        "Portfolio"
    }

    fn fields(&self) -> &'static [&'static str] {
        &["owner", "holdings"]
    }

    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "owner" => Some(Value::from(self.owner.as_str())),
            "holdings" => Some(self.holdings.clone()),
            _ => None,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "owner" => self.owner = expect_str(field, &value)?,
            "holdings" => self.holdings = value,
            other => {
                return Err(Error::MissingKey(format!(
                    "Portfolio has no field `{other}`"
                )))
            }
        }
        Ok(())
    }

    fn clone_record(&self) -> Box<dyn Record> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub fn intc() -> Value {
    Value::record(Stock::new("INTC", "Intel", vec![100.0]))
}

/// The same instrument as a plain mapping instead of a record.
pub fn intc_plain() -> Value {
    Value::map([
        ("ticker", Value::from("INTC")),
        ("name", Value::from("Intel")),
        ("price_history", Value::seq(vec![100.0])),
    ])
}

/// One state shape for the reset-then-edit check.
///
/// A state is edited, a caller-built copy of the initial subtree at `reset_path` is patched
/// back in, and the reset state is edited again. The reset state must not observe the second
/// edit.
pub struct Scenario {
    pub name: &'static str,
    pub initial: fn() -> Value,
    /// Where the INTC instrument lives.
    pub stock_path: Path,
    /// What the reset patch replaces.
    pub reset_path: Path,
}

impl Scenario {
    /// `replace` at `reset_path` carrying a freshly built, caller-owned initial subtree.
    pub fn reset_patch(&self) -> Patch {
        let value = (self.initial)()
            .get_in(&self.reset_path)
            .unwrap_or_else(Value::null);
        Patch::replace(self.reset_path.clone(), value)
    }
}

fn segs(segs: &[&str]) -> Path {
    segs.iter()
        .map(|s| match s.parse::<usize>() {
            Ok(i) => PathSeg::Index(i),
            Err(_) => PathSeg::from(*s),
        })
        .collect()
}

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "mapping of plain instruments, reset the mapping",
            initial: || Value::map([("stocks", Value::map([("INTC", intc_plain())]))]),
            stock_path: segs(&["stocks", "INTC"]),
            reset_path: segs(&["stocks"]),
        },
        Scenario {
            name: "mapping of records, reset the mapping",
            initial: || Value::map([("stocks", Value::map([("INTC", intc())]))]),
            stock_path: segs(&["stocks", "INTC"]),
            reset_path: segs(&["stocks"]),
        },
        Scenario {
            name: "mapping of records, reset the root",
            initial: || Value::map([("stocks", Value::map([("INTC", intc())]))]),
            stock_path: segs(&["stocks", "INTC"]),
            reset_path: Path::root(),
        },
        Scenario {
            name: "record owning a mapping of records, reset the record",
            initial: || {
                Value::map([(
                    "portfolio",
                    Value::record(Portfolio::new("ada", Value::map([("INTC", intc())]))),
                )])
            },
            stock_path: segs(&["portfolio", "holdings", "INTC"]),
            reset_path: segs(&["portfolio"]),
        },
        Scenario {
            name: "sequence of records, reset the sequence",
            initial: || Value::map([("stocks", Value::seq(vec![intc()]))]),
            stock_path: segs(&["stocks", "0"]),
            reset_path: segs(&["stocks"]),
        },
        Scenario {
            name: "single record field, reset the field",
            initial: || Value::map([("stock", intc())]),
            stock_path: segs(&["stock"]),
            reset_path: segs(&["stock"]),
        },
        Scenario {
            name: "root sequence of records, reset the element",
            initial: || Value::seq(vec![intc()]),
            stock_path: segs(&["0"]),
            reset_path: segs(&["0"]),
        },
        Scenario {
            name: "root mapping of records, reset the entry",
            initial: || Value::map([("INTC", intc())]),
            stock_path: segs(&["INTC"]),
            reset_path: segs(&["INTC"]),
        },
        Scenario {
            name: "root record, reset the root",
            initial: intc,
            stock_path: Path::root(),
            reset_path: Path::root(),
        },
    ]
}

/// Appends a price to the instrument at `stock_path`, through the record's own method when it
/// is a record.
pub fn push_price(root: &Draft, stock_path: &Path, price: f64) -> Result<()> {
    let mut draft = root.clone();
    for seg in stock_path {
        draft = draft.child(seg.clone())?;
    }
    match draft.kind()? {
        Kind::Record => draft.update_record(|stock: &mut Stock| {
            stock.push_price(price);
        }),
        _ => draft.child("price_history")?.push(price),
    }
}

/// Price history of the instrument at `stock_path`, as plain numbers.
pub fn price_history(state: &Value, stock_path: &Path) -> Vec<f64> {
    let Some(stock) = state.get_in(stock_path) else {
        return Vec::new();
    };
    if let Some(stock) = stock.record_ref::<Stock>() {
        return stock.price_history.clone();
    }
    stock
        .get("price_history")
        .and_then(|h| h.as_seq().map(|items| items.iter().filter_map(Value::as_float).collect()))
        .unwrap_or_default()
}
