mod drain_order;
