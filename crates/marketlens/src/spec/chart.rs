// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::transformation::{FilterPredicate, Reducer, ValueAxis};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Column,
    Pie,
    Line,
}

impl ChartKind {
    /// Case-insensitive; unsupported kinds fall back to a bar chart.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "column" => Self::Column,
            "pie" => Self::Pie,
            "line" => Self::Line,
            _ => Self::Bar,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Column => "column",
            Self::Pie => "pie",
            Self::Line => "line",
        }
    }
}

/// A chart request checked against a table schema. Only
/// [`SpecResolver`](crate::spec::SpecResolver) builds these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub(crate) chart_type: ChartKind,
    pub(crate) x: Option<String>,
    pub(crate) y: ValueAxis,
    pub(crate) color: Option<String>,
    pub(crate) agg: Reducer,
    pub(crate) top_n: Option<usize>,
    pub(crate) filters: Vec<FilterPredicate>,
    pub(crate) title: String,
}

impl ChartSpec {
    pub fn chart_type(&self) -> ChartKind {
        self.chart_type
    }
    pub fn x(&self) -> Option<&str> {
        self.x.as_deref()
    }
    pub fn y(&self) -> &ValueAxis {
        &self.y
    }
    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }
    pub fn agg(&self) -> Reducer {
        self.agg
    }
    pub fn top_n(&self) -> Option<usize> {
        self.top_n
    }
    pub fn filters(&self) -> &[FilterPredicate] {
        &self.filters
    }
    pub fn title(&self) -> &str {
        &self.title
    }
}
